//! Outbound email for the credential lifecycle.
//!
//! The mailer is an external collaborator from the auth flows' point of view:
//! they hand it a recipient and a link and move on. Sends are fire-and-forget
//! and never fail a request.

use anyhow::Result;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::EmailConfig;

pub struct Mailer {
    config: EmailConfig,
}

impl Mailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Check if email sending is configured and enabled
    pub fn is_enabled(&self) -> bool {
        self.config.is_configured()
    }

    /// Link embedding the token and email as query parameters, against the
    /// configured frontend verification page.
    pub fn verification_link(&self, token: &str, email: &str) -> String {
        format!("{}?token={}&email={}", self.config.verify_url, token, email)
    }

    pub fn reset_link(&self, token: &str, email: &str) -> String {
        format!("{}?token={}&email={}", self.config.reset_url, token, email)
    }

    /// Send the address-ownership proof email issued at registration (and on
    /// re-sends).
    pub async fn send_verification_email(
        &self,
        to_email: &str,
        username: &str,
        link: &str,
    ) -> Result<()> {
        if !self.is_enabled() {
            tracing::warn!(
                "Email not configured, skipping verification email to {}",
                to_email
            );
            return Ok(());
        }

        let subject = "Verify Your Email Address";
        let html_body = render_verification_html(username, link);
        let text_body = render_verification_text(username, link);
        self.send_email(to_email, subject, &html_body, &text_body)
            .await
    }

    pub async fn send_password_reset_email(
        &self,
        to_email: &str,
        username: &str,
        link: &str,
    ) -> Result<()> {
        if !self.is_enabled() {
            tracing::warn!(
                "Email not configured, skipping password reset email to {}",
                to_email
            );
            return Ok(());
        }

        let subject = "Password Reset Request";
        let html_body = render_reset_html(username, link);
        let text_body = render_reset_text(username, link);
        self.send_email(to_email, subject, &html_body, &text_body)
            .await
    }

    /// Send an email with HTML and plain text versions
    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        html_body: &str,
        text_body: &str,
    ) -> Result<()> {
        let smtp_host = self
            .config
            .smtp_host
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("SMTP host not configured"))?;
        let from_address = self
            .config
            .from_address
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("From address not configured"))?;

        let from_mailbox = format!("{} <{}>", self.config.from_name, from_address);
        let from: Mailbox = from_mailbox.parse()?;
        let to: Mailbox = to_email.parse()?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        let mailer = if self.config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer
        };

        mailer.build().send(email).await?;

        tracing::info!(
            to = %to_email,
            subject = %subject,
            "Email sent successfully"
        );

        Ok(())
    }
}

fn render_verification_html(username: &str, link: &str) -> String {
    render_action_html(
        "Verify Your Email Address",
        &format!(
            "Hi <strong>{}</strong>, thanks for signing up for Podhost. \
             Confirm your email address to activate your account.",
            html_escape(username)
        ),
        "Verify Email",
        link,
        "This link expires in 24 hours. If you didn't create an account, you can safely ignore this email.",
    )
}

fn render_verification_text(username: &str, link: &str) -> String {
    format!(
        r#"Verify Your Email Address

Hi {username},

Thanks for signing up for Podhost. Confirm your email address to activate
your account by visiting:

{link}

This link expires in 24 hours. If you didn't create an account, you can
safely ignore this email.

---
Podhost - Host your podcasts with ease"#,
    )
}

fn render_reset_html(username: &str, link: &str) -> String {
    render_action_html(
        "Password Reset Request",
        &format!(
            "Hi <strong>{}</strong>, we received a request to reset your Podhost password.",
            html_escape(username)
        ),
        "Reset Password",
        link,
        "This link expires in 1 hour. If you didn't request a reset, you can safely ignore this email.",
    )
}

fn render_reset_text(username: &str, link: &str) -> String {
    format!(
        r#"Password Reset Request

Hi {username},

We received a request to reset your Podhost password. To choose a new
password, visit:

{link}

This link expires in 1 hour. If you didn't request a reset, you can safely
ignore this email.

---
Podhost - Host your podcasts with ease"#,
    )
}

/// Shared single-button HTML layout for both lifecycle emails
fn render_action_html(title: &str, intro: &str, button: &str, link: &str, note: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Arial, sans-serif;
            margin: 0;
            padding: 0;
            background-color: #f5f5f5;
        }}
        .container {{
            max-width: 560px;
            margin: 0 auto;
            padding: 40px 20px;
        }}
        .card {{
            background-color: #ffffff;
            border-radius: 8px;
            box-shadow: 0 2px 8px rgba(0, 0, 0, 0.06);
            overflow: hidden;
        }}
        .header {{
            background: linear-gradient(135deg, #7c3aed 0%, #6d28d9 100%);
            color: white;
            padding: 32px 24px;
            text-align: center;
        }}
        .header h1 {{
            margin: 0;
            font-size: 24px;
            font-weight: 600;
        }}
        .content {{
            padding: 32px 24px;
        }}
        .content p {{
            margin: 0 0 16px;
            color: #374151;
            line-height: 1.6;
        }}
        .button-container {{
            text-align: center;
            margin: 32px 0;
        }}
        .button {{
            display: inline-block;
            background: linear-gradient(135deg, #7c3aed 0%, #6d28d9 100%);
            color: white !important;
            text-decoration: none;
            padding: 14px 32px;
            border-radius: 6px;
            font-weight: 500;
            font-size: 16px;
        }}
        .note {{
            color: #6b7280;
            font-size: 13px;
            text-align: center;
            margin-top: 24px;
        }}
        .footer {{
            padding: 24px;
            text-align: center;
            color: #9ca3af;
            font-size: 12px;
            border-top: 1px solid #f3f4f6;
        }}
    </style>
</head>
<body>
    <div class="container">
        <div class="card">
            <div class="header">
                <h1>{title}</h1>
            </div>
            <div class="content">
                <p>{intro}</p>
                <div class="button-container">
                    <a href="{link}" class="button">{button}</a>
                </div>
                <p class="note">{note}</p>
            </div>
            <div class="footer">
                <p>Podhost - Host your podcasts with ease</p>
            </div>
        </div>
    </div>
</body>
</html>"#,
    )
}

/// Escape HTML special characters
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("<script>"), "&lt;script&gt;");
        assert_eq!(html_escape("Tom & Jerry"), "Tom &amp; Jerry");
        assert_eq!(html_escape("\"quoted\""), "&quot;quoted&quot;");
    }

    #[test]
    fn test_links_embed_token_and_email() {
        let mailer = Mailer::new(EmailConfig::default());
        let link = mailer.verification_link("abc123", "alice@example.com");
        assert!(link.contains("token=abc123"));
        assert!(link.contains("email=alice@example.com"));
        assert!(link.starts_with("http://localhost:3000/verify-email?"));

        let link = mailer.reset_link("abc123", "alice@example.com");
        assert!(link.starts_with("http://localhost:3000/reset-password?"));
    }

    #[test]
    fn test_render_verification_bodies() {
        let html = render_verification_html("alice", "https://example.com/v?token=t");
        assert!(html.contains("alice"));
        assert!(html.contains("https://example.com/v?token=t"));
        assert!(html.contains("<!DOCTYPE html>"));
        assert!(html.contains("24 hours"));

        let text = render_verification_text("alice", "https://example.com/v?token=t");
        assert!(text.contains("alice"));
        assert!(text.contains("https://example.com/v?token=t"));
    }

    #[test]
    fn test_render_reset_bodies() {
        let html = render_reset_html("alice", "https://example.com/r?token=t");
        assert!(html.contains("Password Reset Request"));
        assert!(html.contains("1 hour"));

        let text = render_reset_text("alice", "https://example.com/r?token=t");
        assert!(text.contains("https://example.com/r?token=t"));
    }

    #[test]
    fn test_usernames_are_escaped_in_html() {
        let html = render_verification_html("<b>alice</b>", "https://example.com");
        assert!(html.contains("&lt;b&gt;alice&lt;/b&gt;"));
    }

    #[test]
    fn test_mailer_disabled_without_smtp() {
        let mailer = Mailer::new(EmailConfig::default());
        assert!(!mailer.is_enabled());
    }
}
