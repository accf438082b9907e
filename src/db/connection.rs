//! Database connections using sqlx
//!
//! Every helper opens its own connection and closes it before returning.

use crate::config::PgSettings;
use crate::error::Result;
use sqlx::postgres::PgConnection;
use sqlx::Connection;
use tracing::debug;

/// Open a single connection.
pub async fn connect(settings: &PgSettings) -> Result<PgConnection> {
    debug!("Connecting to {}", settings.redacted_url());
    let conn = PgConnection::connect_with(&settings.connect_options()).await?;
    Ok(conn)
}

/// Close `conn`, then hand back `result`. A close failure only wins when the
/// work itself succeeded.
pub(crate) async fn close_with<T>(conn: PgConnection, result: Result<T>) -> Result<T> {
    let closed = conn.close().await;
    let value = result?;
    closed?;
    Ok(value)
}
