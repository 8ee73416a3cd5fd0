use chrono::{TimeDelta, Utc};
use docflow::db::Database;
use docflow::error::PersistenceError;
use docflow::gateway::{PersistenceGateway, RelationshipStore};
use docflow::models::*;
use speculate2::speculate;
use tokio_test::block_on;
use uuid::Uuid;

fn create_test_document(db: &Database, doc_type: DocumentType) -> Document {
    db.create_document(CreateDocumentInput {
        doc_type,
        content: DocumentContent {
            title: format!("Test {doc_type}"),
            ..Default::default()
        },
    })
    .expect("Failed to create document")
}

fn sample_content() -> DocumentContent {
    DocumentContent {
        title: "INV-2024-001".to_string(),
        client: ClientInfo {
            name: "Acme Ltd".to_string(),
            email: "billing@acme.test".to_string(),
            ..Default::default()
        },
        items: vec![
            LineItem::new("Design", 2.0, 500.0),
            LineItem::new("Build", 10.0, 120.0),
        ],
        notes: "Net 30".to_string(),
        terms: ContractTerms::default(),
    }
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to run migrations");
    }

    describe "documents" {
        describe "create_document" {
            it "creates an unpaid document with a fresh id" {
                let document = db.create_document(CreateDocumentInput {
                    doc_type: DocumentType::Invoice,
                    content: sample_content(),
                }).expect("Failed to create document");

                assert_eq!(document.doc_type, DocumentType::Invoice);
                assert_eq!(document.status, PaymentStatus::unpaid());
                assert_eq!(document.content.items.len(), 2);
                assert!(!document.id.is_nil());
            }

            it "stores content as it was given" {
                let created = db.create_document(CreateDocumentInput {
                    doc_type: DocumentType::Quotation,
                    content: sample_content(),
                }).expect("Failed to create document");

                let found = db.get_document(created.id).expect("Query failed").unwrap();
                assert_eq!(found.content, sample_content_with_ids(&created.content));
                assert_eq!(found.content.total(), 2200.0);
            }
        }

        describe "get_document" {
            it "returns None for a non-existent document" {
                let result = db.get_document(Uuid::new_v4()).expect("Query failed");
                assert!(result.is_none());
            }
        }

        describe "get_documents" {
            it "returns empty list when no documents exist" {
                let documents = db.get_documents(None).expect("Query failed");
                assert!(documents.is_empty());
            }

            it "filters by type" {
                create_test_document(&db, DocumentType::Quotation);
                create_test_document(&db, DocumentType::Invoice);
                create_test_document(&db, DocumentType::Invoice);

                let all = db.get_documents(None).expect("Query failed");
                let invoices = db.get_documents(Some(DocumentType::Invoice)).expect("Query failed");
                let receipts = db.get_documents(Some(DocumentType::Receipt)).expect("Query failed");

                assert_eq!(all.len(), 3);
                assert_eq!(invoices.len(), 2);
                assert!(invoices.iter().all(|d| d.doc_type == DocumentType::Invoice));
                assert!(receipts.is_empty());
            }
        }

        describe "save_document" {
            it "inserts a draft without an id" {
                let mut draft = DocumentDraft::new(DocumentType::Contract);
                draft.content.title = "Service agreement".to_string();

                let saved = db.save_document(draft).expect("Save failed").unwrap();

                let found = db.get_document(saved.id).expect("Query failed").unwrap();
                assert_eq!(found.content.title, "Service agreement");
                assert_eq!(found.doc_type, DocumentType::Contract);
            }

            it "inserts a paid draft with its status in a single write" {
                let paid_at = Utc::now();
                let mut draft = DocumentDraft::new(DocumentType::Receipt);
                draft.status = PaymentStatus {
                    state: PaymentState::Paid,
                    paid_at: Some(paid_at),
                    undo_deadline: Some(paid_at + TimeDelta::seconds(10)),
                };

                let saved = db.save_document(draft).expect("Save failed").unwrap();
                assert_eq!(saved.status.state, PaymentState::Paid);
                assert_eq!(saved.created_at, saved.updated_at);

                let found = db.get_document(saved.id).expect("Query failed").unwrap();
                assert_eq!(found.status.state, PaymentState::Paid);
                assert_eq!(
                    found.status.undo_deadline.map(|t| t.timestamp_millis()),
                    Some((paid_at + TimeDelta::seconds(10)).timestamp_millis())
                );
                assert_eq!(found.created_at, found.updated_at);
            }

            it "updates in place when the draft carries an id" {
                let created = create_test_document(&db, DocumentType::Invoice);
                let mut draft = DocumentDraft::from(created.clone());
                draft.content.notes = "Updated".to_string();

                let saved = db.save_document(draft).expect("Save failed").unwrap();

                assert_eq!(saved.id, created.id);
                assert_eq!(saved.created_at, created.created_at);
                assert_eq!(db.get_documents(None).expect("Query failed").len(), 1);
                assert_eq!(db.get_document(created.id).unwrap().unwrap().content.notes, "Updated");
            }

            it "returns None for an unknown id" {
                let mut draft = DocumentDraft::new(DocumentType::Invoice);
                draft.id = Some(Uuid::new_v4());

                let result = db.save_document(draft).expect("Save failed");
                assert!(result.is_none());
            }

            it "persists a payment status" {
                let created = create_test_document(&db, DocumentType::Invoice);
                let paid_at = Utc::now();
                let status = PaymentStatus {
                    state: PaymentState::Paid,
                    paid_at: Some(paid_at),
                    undo_deadline: Some(paid_at + TimeDelta::seconds(10)),
                };

                db.update_document_status(created.id, status.clone()).expect("Update failed");

                let found = db.get_document(created.id).unwrap().unwrap();
                assert_eq!(found.status.state, PaymentState::Paid);
                assert_eq!(
                    found.status.paid_at.map(|t| t.timestamp_millis()),
                    Some(paid_at.timestamp_millis())
                );
                assert!(found.status.undo_deadline.is_some());
            }
        }

        describe "update_document" {
            it "replaces content and keeps status" {
                let created = create_test_document(&db, DocumentType::Quotation);

                let updated = db.update_document(created.id, UpdateDocumentInput {
                    content: sample_content(),
                }).expect("Update failed").unwrap();

                assert_eq!(updated.content.title, "INV-2024-001");
                assert_eq!(updated.status, created.status);
            }

            it "returns None for a non-existent document" {
                let result = db.update_document(Uuid::new_v4(), UpdateDocumentInput {
                    content: DocumentContent::default(),
                }).expect("Update failed");
                assert!(result.is_none());
            }
        }

        describe "delete_document" {
            it "returns false for a non-existent document" {
                assert!(!db.delete_document(Uuid::new_v4()).expect("Delete failed"));
            }

            it "removes every relationship touching the document" {
                let quotation = create_test_document(&db, DocumentType::Quotation);
                let invoice = create_test_document(&db, DocumentType::Invoice);
                let receipt = create_test_document(&db, DocumentType::Receipt);
                db.create_relationship(quotation.id, invoice.id, RelationshipType::QuotationToInvoice).unwrap();
                db.create_relationship(invoice.id, receipt.id, RelationshipType::ToReceipt).unwrap();

                assert!(db.delete_document(invoice.id).expect("Delete failed"));

                assert!(db.get_document(invoice.id).unwrap().is_none());
                assert!(db.get_relationships(quotation.id).unwrap().is_empty());
                assert!(db.get_relationships(receipt.id).unwrap().is_empty());
            }
        }
    }

    describe "relationships" {
        it "lists edges where the document is source or target" {
            let quotation = create_test_document(&db, DocumentType::Quotation);
            let contract = create_test_document(&db, DocumentType::Contract);
            let invoice = create_test_document(&db, DocumentType::Invoice);
            db.create_relationship(quotation.id, contract.id, RelationshipType::QuotationToContract).unwrap();
            db.create_relationship(contract.id, invoice.id, RelationshipType::ContractToInvoice).unwrap();

            let edges = db.get_relationships(contract.id).expect("Query failed");

            assert_eq!(edges.len(), 2);
            assert_eq!(edges[0].relationship_type, RelationshipType::QuotationToContract);
            assert_eq!(edges[1].relationship_type, RelationshipType::ContractToInvoice);
        }

        it "rejects a second edge between the same pair" {
            let invoice = create_test_document(&db, DocumentType::Invoice);
            let receipt = create_test_document(&db, DocumentType::Receipt);
            db.create_relationship(invoice.id, receipt.id, RelationshipType::ToReceipt).unwrap();

            let result = db.create_relationship(invoice.id, receipt.id, RelationshipType::ToReceipt);
            assert!(result.is_err());
        }

        it "rejects an edge to a missing document" {
            let invoice = create_test_document(&db, DocumentType::Invoice);

            let result = db.create_relationship(invoice.id, Uuid::new_v4(), RelationshipType::ToReceipt);
            assert!(result.is_err());
        }

        it "deletes a single edge by id" {
            let invoice = create_test_document(&db, DocumentType::Invoice);
            let receipt = create_test_document(&db, DocumentType::Receipt);
            let edge = db.create_relationship(invoice.id, receipt.id, RelationshipType::ToReceipt).unwrap();

            assert_eq!(db.get_relationship(edge.id).unwrap(), Some(edge.clone()));
            assert!(db.delete_relationship(edge.id).expect("Delete failed"));
            assert!(!db.delete_relationship(edge.id).expect("Delete failed"));
            assert!(db.get_relationship(edge.id).unwrap().is_none());
        }
    }

    describe "gateway" {
        it "assigns an id on first save and updates afterwards" {
            let draft = DocumentDraft::new(DocumentType::Receipt);

            let first = block_on(PersistenceGateway::save(&db, draft)).expect("Save failed");
            let mut again = DocumentDraft::from(first.clone());
            again.content.title = "RC-1".to_string();
            let second = block_on(PersistenceGateway::save(&db, again)).expect("Save failed");

            assert_eq!(first.id, second.id);
            let found = block_on(PersistenceGateway::get(&db, first.id)).unwrap().unwrap();
            assert_eq!(found.content.title, "RC-1");
        }

        it "reports NotFound when updating an unknown id" {
            let id = Uuid::new_v4();
            let mut draft = DocumentDraft::new(DocumentType::Invoice);
            draft.id = Some(id);

            let result = block_on(PersistenceGateway::save(&db, draft));
            assert!(matches!(result, Err(PersistenceError::NotFound(missing)) if missing == id));
        }

        it "creates, lists and removes edges" {
            let invoice = create_test_document(&db, DocumentType::Invoice);
            let receipt = create_test_document(&db, DocumentType::Receipt);

            let edge = block_on(RelationshipStore::create(&db, invoice.id, receipt.id, RelationshipType::ToReceipt)).unwrap();
            assert_eq!(block_on(RelationshipStore::list(&db, receipt.id)).unwrap(), vec![edge.clone()]);

            assert!(block_on(RelationshipStore::remove(&db, edge.id)).unwrap());
            assert!(block_on(RelationshipStore::list(&db, invoice.id)).unwrap().is_empty());
        }

        it "deletes through the gateway" {
            let invoice = create_test_document(&db, DocumentType::Invoice);

            assert!(block_on(PersistenceGateway::delete(&db, invoice.id)).unwrap());
            assert!(!block_on(PersistenceGateway::delete(&db, invoice.id)).unwrap());
        }
    }

    describe "file-backed database" {
        it "keeps documents across reopen" {
            let dir = tempfile::tempdir().expect("Failed to create temp dir");
            let path = dir.path().join("nested").join("docflow.db");

            let id = {
                let db = Database::open(path.clone()).expect("Failed to open");
                db.migrate().expect("Failed to migrate");
                create_test_document(&db, DocumentType::Contract).id
            };

            let reopened = Database::open(path).expect("Failed to reopen");
            reopened.migrate().expect("Failed to migrate");
            let found = reopened.get_document(id).expect("Query failed");
            assert_eq!(found.map(|d| d.doc_type), Some(DocumentType::Contract));
        }
    }
}

/// `LineItem::new` assigns random ids, so compare against the stored ids.
fn sample_content_with_ids(stored: &DocumentContent) -> DocumentContent {
    let mut expected = sample_content();
    for (item, stored) in expected.items.iter_mut().zip(&stored.items) {
        item.id = stored.id;
    }
    expected
}
