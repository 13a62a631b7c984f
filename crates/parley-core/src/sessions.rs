use async_trait::async_trait;
use parley_db::socket_sessions::SocketSessionRow;
use parley_db::DbPool;
use parley_models::session::SocketSession;

use crate::error::CoreError;

/// User-to-socket reachability. Storage errors are returned unchanged and
/// nothing is retried.
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    /// Upsert by user: an existing session has its socket id replaced.
    async fn register(&self, user_id: i64, socket_id: &str) -> Result<SocketSession, CoreError>;
    async fn unregister_by_socket(
        &self,
        socket_id: &str,
    ) -> Result<Option<SocketSession>, CoreError>;
    async fn find_by_user(&self, user_id: i64) -> Result<Option<SocketSession>, CoreError>;
    async fn find_by_socket(&self, socket_id: &str) -> Result<Option<SocketSession>, CoreError>;
    async fn find_all_by_users(&self, user_ids: &[i64]) -> Result<Vec<SocketSession>, CoreError>;
}

pub struct DbSessionRegistry {
    db: DbPool,
}

impl DbSessionRegistry {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

fn to_session(row: SocketSessionRow) -> SocketSession {
    SocketSession {
        user_id: row.user_id,
        socket_id: row.socket_id,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

#[async_trait]
impl SessionRegistry for DbSessionRegistry {
    async fn register(&self, user_id: i64, socket_id: &str) -> Result<SocketSession, CoreError> {
        let row =
            parley_db::socket_sessions::upsert_socket_session(&self.db, user_id, socket_id).await?;
        Ok(to_session(row))
    }

    async fn unregister_by_socket(
        &self,
        socket_id: &str,
    ) -> Result<Option<SocketSession>, CoreError> {
        let row = parley_db::socket_sessions::delete_by_socket(&self.db, socket_id).await?;
        Ok(row.map(to_session))
    }

    async fn find_by_user(&self, user_id: i64) -> Result<Option<SocketSession>, CoreError> {
        let row = parley_db::socket_sessions::get_by_user(&self.db, user_id).await?;
        Ok(row.map(to_session))
    }

    async fn find_by_socket(&self, socket_id: &str) -> Result<Option<SocketSession>, CoreError> {
        let row = parley_db::socket_sessions::get_by_socket(&self.db, socket_id).await?;
        Ok(row.map(to_session))
    }

    async fn find_all_by_users(&self, user_ids: &[i64]) -> Result<Vec<SocketSession>, CoreError> {
        let rows = parley_db::socket_sessions::list_by_users(&self.db, user_ids).await?;
        Ok(rows.into_iter().map(to_session).collect())
    }
}
