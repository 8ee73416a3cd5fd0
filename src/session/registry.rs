//! Open sessions keyed by document id.
//!
//! Every writer that goes through the registry for a document shares one
//! [`DocumentSession`], so the snapshot the session saves always includes
//! status changes made by any of them.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use super::{DocumentSession, SessionConfig};
use crate::error::SessionError;
use crate::gateway::PersistenceGateway;

#[derive(Clone)]
pub struct SessionRegistry {
    gateway: Arc<dyn PersistenceGateway>,
    config: SessionConfig,
    sessions: Arc<Mutex<HashMap<Uuid, DocumentSession>>>,
}

impl SessionRegistry {
    pub fn new(gateway: Arc<dyn PersistenceGateway>, config: SessionConfig) -> Self {
        Self {
            gateway,
            config,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The open session for `id`, opening one from the store if needed.
    pub async fn open(&self, id: Uuid) -> Result<DocumentSession, SessionError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(&id) {
            return Ok(session.clone());
        }

        let session = DocumentSession::open(id, Arc::clone(&self.gateway), self.config).await?;
        sessions.insert(id, session.clone());
        tracing::debug!("Registered session for {}", id);
        Ok(session)
    }

    pub async fn get(&self, id: Uuid) -> Option<DocumentSession> {
        self.sessions.lock().await.get(&id).cloned()
    }

    pub async fn is_open(&self, id: Uuid) -> bool {
        self.sessions.lock().await.contains_key(&id)
    }

    /// Flush and close the session for `id`. Returns `Ok(false)` if none was open.
    pub async fn close(&self, id: Uuid) -> Result<bool, SessionError> {
        let Some(session) = self.sessions.lock().await.remove(&id) else {
            return Ok(false);
        };
        session.close().await?;
        tracing::debug!("Closed session for {}", id);
        Ok(true)
    }
}
