//! # Messaging Façade
//!
//! The interface between the identity flows and the external email/SMS
//! delivery providers. The gateway renders templates and selects the
//! per-application sender profile; actual delivery is a backend concern
//! behind the [`EmailSender`] / [`SmsSender`] traits.
//!
//! ```text
//! OtpService ──► MessagingService ──► render template
//!                      │                    │
//!                      ├── email profile ◄──┘ (per application, with
//!                      │                       gateway-wide fallback)
//!                      ▼
//!            EmailSender / SmsSender (external backend)
//! ```
//!
//! Delivery failures surface as `ServiceUnavailable`; flows that enqueue a
//! send after committing state (OTP rows) treat them as retriable by the
//! user re-initiating.

use async_trait::async_trait;
use shared::errors::ApiError;
use tracing::info;
use uuid::Uuid;

use crate::repository::ApplicationRepository;

// =============================================================================
// BACKEND TRAITS
// =============================================================================

/// Outbound email delivery backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Delivers one message. `from` is the selected profile's
    /// `"Name <address>"` rendering.
    async fn send_email(
        &self,
        from: &str,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), ApiError>;
}

/// Outbound SMS delivery backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SmsSender: Send + Sync {
    /// Delivers one message.
    async fn send_sms(&self, to: &str, body: &str) -> Result<(), ApiError>;
}

/// Development backend: logs instead of delivering.
///
/// The message body is **not** logged — it carries OTP codes.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingSender;

#[async_trait]
impl EmailSender for LoggingSender {
    async fn send_email(
        &self,
        from: &str,
        to: &str,
        subject: &str,
        _body: &str,
    ) -> Result<(), ApiError> {
        info!(from = from, to = to, subject = subject, "email queued (logging backend)");
        Ok(())
    }
}

#[async_trait]
impl SmsSender for LoggingSender {
    async fn send_sms(&self, to: &str, _body: &str) -> Result<(), ApiError> {
        info!(to = to, "sms queued (logging backend)");
        Ok(())
    }
}

// =============================================================================
// TEMPLATES
// =============================================================================

/// Message kinds with built-in templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// OTP delivery for any flow
    OtpCode,
    /// Notice after a password change
    PasswordChanged,
}

impl MessageKind {
    /// Subject line for email delivery.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::OtpCode => "Your verification code",
            Self::PasswordChanged => "Your password was changed",
        }
    }

    /// Body template with `{{placeholder}}` slots.
    pub fn template(&self) -> &'static str {
        match self {
            Self::OtpCode => {
                "Your verification code is {{code}}. It expires in {{ttl_minutes}} minutes. \
                 If you did not request it, ignore this message."
            }
            Self::PasswordChanged => {
                "The password for your account was just changed. \
                 If this was not you, revoke your sessions immediately."
            }
        }
    }
}

/// Substitutes `{{key}}` placeholders.
///
/// Unknown placeholders are left verbatim so a template typo shows up in
/// review rather than rendering as an empty hole.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{{{}}}}}", key), value);
    }
    out
}

// =============================================================================
// MESSAGING SERVICE
// =============================================================================

/// Fallback sender identity when an application has no email profile.
const DEFAULT_FROM: &str = "Auth Gateway <no-reply@auth.example.com>";

/// Renders templates, selects the per-application sender profile, and
/// hands messages to the configured backends.
#[derive(Clone)]
pub struct MessagingService {
    applications: ApplicationRepository,
    email: std::sync::Arc<dyn EmailSender>,
    sms: std::sync::Arc<dyn SmsSender>,
}

impl MessagingService {
    /// Creates the façade over the configured backends.
    pub fn new(
        applications: ApplicationRepository,
        email: std::sync::Arc<dyn EmailSender>,
        sms: std::sync::Arc<dyn SmsSender>,
    ) -> Self {
        Self {
            applications,
            email,
            sms,
        }
    }

    /// Sends a templated email, branded by the application's default
    /// profile when one exists.
    pub async fn send_email(
        &self,
        application_id: Option<Uuid>,
        to: &str,
        kind: MessageKind,
        vars: &[(&str, &str)],
    ) -> Result<(), ApiError> {
        let from = match application_id {
            Some(app_id) => match self.applications.find_default_email_profile(app_id).await? {
                Some(profile) => format!("{} <{}>", profile.from_name, profile.from_address),
                None => DEFAULT_FROM.to_string(),
            },
            None => DEFAULT_FROM.to_string(),
        };

        let body = render(kind.template(), vars);
        self.email.send_email(&from, to, kind.subject(), &body).await
    }

    /// Sends a caller-composed email (the `SendEmail` RPC surface).
    ///
    /// Branding still follows the application's profile; only subject and
    /// body come from the caller.
    pub async fn send_raw_email(
        &self,
        application_id: Option<Uuid>,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), ApiError> {
        let from = match application_id {
            Some(app_id) => match self.applications.find_default_email_profile(app_id).await? {
                Some(profile) => format!("{} <{}>", profile.from_name, profile.from_address),
                None => DEFAULT_FROM.to_string(),
            },
            None => DEFAULT_FROM.to_string(),
        };

        self.email.send_email(&from, to, subject, body).await
    }

    /// Sends a templated SMS.
    pub async fn send_sms(
        &self,
        to: &str,
        kind: MessageKind,
        vars: &[(&str, &str)],
    ) -> Result<(), ApiError> {
        let body = render(kind.template(), vars);
        self.sms.send_sms(to, &body).await
    }
}

impl std::fmt::Debug for MessagingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagingService").finish_non_exhaustive()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_all_occurrences() {
        let out = render("code {{code}} expires; repeat: {{code}}", &[("code", "123456")]);
        assert_eq!(out, "code 123456 expires; repeat: 123456");
    }

    #[test]
    fn test_render_leaves_unknown_placeholders() {
        let out = render("hello {{name}}", &[("code", "x")]);
        assert_eq!(out, "hello {{name}}");
    }

    #[test]
    fn test_otp_template_renders_code_and_ttl() {
        let body = render(
            MessageKind::OtpCode.template(),
            &[("code", "042187"), ("ttl_minutes", "10")],
        );
        assert!(body.contains("042187"));
        assert!(body.contains("10 minutes"));
        assert!(!body.contains("{{"));
    }

    #[tokio::test]
    async fn test_logging_sender_accepts_messages() {
        let sender = LoggingSender;
        sender
            .send_email("a <a@x>", "b@x", "subject", "body")
            .await
            .unwrap();
        sender.send_sms("+15551234567", "body").await.unwrap();
    }

    #[tokio::test]
    async fn test_mock_email_sender_records_call() {
        let mut mock = MockEmailSender::new();
        mock.expect_send_email()
            .withf(|_, to, subject, body| {
                to == "bob@example.com"
                    && subject == "Your verification code"
                    && body.contains("654321")
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let body = render(MessageKind::OtpCode.template(), &[("code", "654321"), ("ttl_minutes", "10")]);
        mock.send_email("x <x@x>", "bob@example.com", MessageKind::OtpCode.subject(), &body)
            .await
            .unwrap();
    }
}
