use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::error::{Result, TcmError};
use crate::model::Connection;
use crate::security::CredentialCipher;
use crate::store::traits::ConnectionStore;

#[derive(sqlx::FromRow)]
struct Row {
    data: String,
    credential_ciphertext: String,
    credential_nonce: String,
}

#[derive(Clone)]
pub struct SqliteConnectionStore {
    pool: SqlitePool,
    cipher: CredentialCipher,
}

impl SqliteConnectionStore {
    pub fn new(pool: SqlitePool, cipher: CredentialCipher) -> Self {
        Self { pool, cipher }
    }

    fn decode(&self, row: Row) -> Result<Connection> {
        let mut connection: Connection =
            serde_json::from_str(&row.data).map_err(|e| TcmError::Other(e.into()))?;
        connection.credential = self
            .cipher
            .decrypt(&row.credential_ciphertext, &row.credential_nonce)
            .map_err(TcmError::Other)?;
        Ok(connection)
    }
}

#[async_trait]
impl ConnectionStore for SqliteConnectionStore {
    async fn list(&self) -> Result<Vec<Connection>> {
        let rows = sqlx::query_as::<_, Row>("SELECT data, credential_ciphertext, credential_nonce FROM connections")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|r| self.decode(r)).collect()
    }

    async fn get(&self, interface_id: i64) -> Result<Option<Connection>> {
        let row = sqlx::query_as::<_, Row>(
            "SELECT data, credential_ciphertext, credential_nonce FROM connections WHERE interface_id = ?",
        )
        .bind(interface_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| self.decode(r)).transpose()
    }

    async fn upsert(&self, connection: &Connection) -> Result<Connection> {
        let (ciphertext, nonce) = self.cipher.encrypt(&connection.credential).map_err(TcmError::Other)?;
        let data = serde_json::to_string(connection).map_err(|e| TcmError::Other(e.into()))?;
        let kind = serde_json::to_string(&connection.kind).map_err(|e| TcmError::Other(e.into()))?;

        sqlx::query(
            "INSERT INTO connections (interface_id, kind, data, credential_ciphertext, credential_nonce)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(interface_id) DO UPDATE SET
                kind = excluded.kind,
                data = excluded.data,
                credential_ciphertext = excluded.credential_ciphertext,
                credential_nonce = excluded.credential_nonce",
        )
        .bind(connection.interface_id)
        .bind(kind)
        .bind(&data)
        .bind(&ciphertext)
        .bind(&nonce)
        .execute(&self.pool)
        .await?;

        Ok(connection.clone())
    }
}
