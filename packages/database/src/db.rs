//! Database connection utilities.

use std::time::Duration;

use switchy_database::Database;
use switchy_database_connection::Credentials;

/// Opens a `PostgreSQL` connection to the report store.
///
/// Sets `statement_timeout` to `statement_timeout` so a stalled scan fails
/// on the server side as well as at the caller's deadline.
///
/// # Errors
///
/// Returns an error if the URL cannot be parsed or the connection fails.
pub async fn connect(
    url: &str,
    statement_timeout: Duration,
) -> Result<Box<dyn Database>, Box<dyn std::error::Error>> {
    // Strip query parameters (e.g. ?sslmode=require) that the Credentials
    // parser doesn't understand. TLS is handled by the connector.
    let url_base = url.split('?').next().unwrap_or(url);

    let creds = Credentials::from_url(url_base)?;
    let db = switchy_database_connection::init_postgres_raw_native_tls(creds).await?;

    let millis = statement_timeout.as_millis().max(1);
    db.exec_raw(&format!("SET statement_timeout = {millis}"))
        .await?;

    log::info!("Connected to report store (statement_timeout={millis}ms)");

    Ok(db)
}
