use lettre::{
    Message, SmtpTransport, Transport,
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
};
use log::{info, error, warn};

pub struct EmailService;

impl EmailService {
    pub async fn send_password_reset_otp(email: &str, otp: &str) -> bool {
        match Self::try_send_reset_otp(email, otp).await {
            Ok(_) => {
                info!("Password reset email sent to {}", email);
                true
            }
            Err(e) => {
                error!("Failed to send password reset email to {}: {}", email, e);
                false
            }
        }
    }

    async fn try_send_reset_otp(email: &str, otp: &str) -> Result<(), Box<dyn std::error::Error>> {
        let mail_user = crate::config::Config::mail_user();
        let mail_password = crate::config::Config::mail_password();

        if mail_user.is_empty() || mail_password.is_empty() {
            warn!("Email credentials not configured. Skipping email send.");
            return Err("Email not configured".into());
        }

        let from_mailbox: Mailbox = crate::config::Config::mail_from().parse()?;
        let to_mailbox: Mailbox = email.parse()?;

        let email_body = format!(
            r#"
            <!DOCTYPE html>
            <html>
            <body style="font-family: Arial, sans-serif; color: #333;">
                <h2>WorkBridge password reset</h2>
                <p>Hello,</p>
                <p>We received a request to reset the password for this account.
                   Enter the code below to continue:</p>
                <p style="font-size: 32px; font-weight: bold; letter-spacing: 5px;">{}</p>
                <p>The code is valid for 10 minutes. Never share it with anyone.</p>
                <p>If you didn't request a reset, you can safely ignore this email.</p>
                <p>— The WorkBridge Team</p>
            </body>
            </html>
            "#,
            otp
        );

        let email_message = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject("Your WorkBridge password reset code")
            .header(ContentType::TEXT_HTML)
            .body(email_body)?;

        let creds = Credentials::new(mail_user, mail_password);
        let mailer = SmtpTransport::relay(&crate::config::Config::mail_host())?
            .credentials(creds)
            .build();

        mailer.send(&email_message)?;
        Ok(())
    }

    pub async fn send_welcome_email(email: &str, name: &str) -> bool {
        match Self::try_send_welcome(email, name).await {
            Ok(_) => {
                info!("Welcome email sent to {}", email);
                true
            }
            Err(e) => {
                error!("Failed to send welcome email: {}", e);
                false
            }
        }
    }

    async fn try_send_welcome(email: &str, name: &str) -> Result<(), Box<dyn std::error::Error>> {
        let mail_user = crate::config::Config::mail_user();
        let mail_password = crate::config::Config::mail_password();

        if mail_user.is_empty() || mail_password.is_empty() {
            return Err("Email not configured".into());
        }

        let display_name = if name.is_empty() { "there" } else { name };

        let from_mailbox: Mailbox = crate::config::Config::mail_from().parse()?;
        let to_mailbox: Mailbox = email.parse()?;

        let email_body = format!(
            r#"
            <!DOCTYPE html>
            <html>
            <body>
                <h1>Welcome to WorkBridge!</h1>
                <p>Hi {},</p>
                <p>Your account is ready. With WorkBridge you can:</p>
                <ul>
                    <li>Post jobs and reach skilled freelancers</li>
                    <li>Browse open jobs across every category</li>
                    <li>Upgrade your plan whenever you need more postings</li>
                </ul>
                <p>Free accounts include 3 job posts to get you started.</p>
                <p>— The WorkBridge Team</p>
            </body>
            </html>
            "#,
            display_name
        );

        let email_message = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject("Welcome to WorkBridge!")
            .header(ContentType::TEXT_HTML)
            .body(email_body)?;

        let creds = Credentials::new(mail_user, mail_password);
        let mailer = SmtpTransport::relay(&crate::config::Config::mail_host())?
            .credentials(creds)
            .build();

        mailer.send(&email_message)?;
        Ok(())
    }
}
