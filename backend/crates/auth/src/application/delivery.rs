//! Code Delivery
//!
//! Hands freshly issued codes to whatever sends them (mail, SMS). Delivery
//! must not block the login request, so implementations enqueue.

use chrono::{DateTime, Utc};
use kernel::id::IdentityId;
use tokio::sync::mpsc;
use zeroize::Zeroizing;

use crate::application::otp_challenge::IssuedChallenge;
use crate::domain::value_object::{email::Email, otp_purpose::OtpPurpose};
use crate::error::{AuthError, AuthResult};

/// Outbound code delivery
pub trait OtpDelivery: Send + Sync {
    fn deliver(&self, email: &Email, challenge: &IssuedChallenge) -> AuthResult<()>;
}

/// Records that a code went out, without the code
///
/// For deployments where codes are read from a bypass or another channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingOtpDelivery;

impl OtpDelivery for TracingOtpDelivery {
    fn deliver(&self, email: &Email, challenge: &IssuedChallenge) -> AuthResult<()> {
        tracing::info!(
            identity_id = %challenge.identity_id,
            challenge_id = %challenge.challenge_id,
            email = %email,
            purpose = %challenge.purpose,
            expires_at = %challenge.expires_at,
            "Verification code ready for delivery"
        );
        Ok(())
    }
}

/// A code waiting to be sent
pub struct OtpMessage {
    pub identity_id: IdentityId,
    pub email: Email,
    pub purpose: OtpPurpose,
    pub code: Zeroizing<String>,
    pub expires_at: DateTime<Utc>,
}

/// Queues codes on a bounded channel drained by a sender task
#[derive(Clone)]
pub struct ChannelOtpDelivery {
    sender: mpsc::Sender<OtpMessage>,
}

impl ChannelOtpDelivery {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<OtpMessage>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl OtpDelivery for ChannelOtpDelivery {
    fn deliver(&self, email: &Email, challenge: &IssuedChallenge) -> AuthResult<()> {
        let message = OtpMessage {
            identity_id: challenge.identity_id,
            email: email.clone(),
            purpose: challenge.purpose,
            code: challenge.code.clone(),
            expires_at: challenge.expires_at,
        };

        self.sender.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                AuthError::Internal("code delivery queue is full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                AuthError::Internal("code delivery queue is closed".to_string())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel::id::ChallengeId;

    fn issued() -> IssuedChallenge {
        IssuedChallenge {
            challenge_id: ChallengeId::new(),
            identity_id: IdentityId::new(),
            purpose: OtpPurpose::Login,
            code: Zeroizing::new("123456".to_string()),
            expires_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_channel_delivery() {
        let (delivery, mut rx) = ChannelOtpDelivery::new(4);
        let email = Email::new("ops@example.com").unwrap();
        delivery.deliver(&email, &issued()).unwrap();

        let message = rx.recv().await.unwrap();
        assert_eq!(message.email, email);
        assert_eq!(message.code.as_str(), "123456");
    }

    #[test]
    fn test_full_queue_is_an_error() {
        let (delivery, _rx) = ChannelOtpDelivery::new(1);
        let email = Email::new("ops@example.com").unwrap();
        delivery.deliver(&email, &issued()).unwrap();
        assert!(matches!(
            delivery.deliver(&email, &issued()),
            Err(AuthError::Internal(_))
        ));
    }
}
