/// Outbound mail
///
/// Registration delivers one-time codes by email. The transport is behind a
/// trait so tests and development run without an SMTP provider; the default
/// implementation just logs the message.

use async_trait::async_trait;

/// Mail transport
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Sends a plain-text message
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

/// Development transport that writes messages to the log instead of sending
pub struct TracingMailer;

#[async_trait]
impl Mailer for TracingMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        tracing::info!(to, subject, body, "Outbound mail (not sent, logging transport)");
        Ok(())
    }
}

pub mod testing {
    //! Transport that captures messages for test assertions

    use super::*;
    use std::sync::Mutex;

    /// Records every message instead of sending it
    #[derive(Default)]
    pub struct CapturingMailer {
        pub sent: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl Mailer for CapturingMailer {
        async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string(), body.to_string()));
            Ok(())
        }
    }
}
