use axum::async_trait;

/// Outbound delivery channel for one-time codes. Actual delivery (email, SMS)
/// is an external collaborator; deployments plug in a real implementation.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_code(&self, email: &str, purpose: &str, code: &str) -> anyhow::Result<()>;
}

/// Development mailer: writes the code to the log instead of sending it.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_code(&self, email: &str, purpose: &str, code: &str) -> anyhow::Result<()> {
        tracing::info!(%email, %purpose, %code, "one-time code dispatched");
        Ok(())
    }
}
