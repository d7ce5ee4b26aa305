#[cfg(not(feature = "mock-email"))]
use anyhow::Context;
use anyhow::Result;
#[cfg(not(feature = "mock-email"))]
use resend_rs::{Resend, types::CreateEmailBaseOptions};
#[cfg(not(feature = "mock-email"))]
use secrecy::ExposeSecret;
use secrecy::SecretBox;

pub struct EmailService {
    #[cfg(not(feature = "mock-email"))]
    client: Resend,
    from_address: String,
}

#[derive(Debug, Clone)]
pub struct EmailTemplate {
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

impl EmailService {
    #[cfg(not(feature = "mock-email"))]
    pub fn new(api_key: SecretBox<String>, from_address: String) -> Self {
        let client = Resend::new(api_key.expose_secret());
        Self {
            client,
            from_address,
        }
    }

    #[cfg(feature = "mock-email")]
    pub fn new(_api_key: SecretBox<String>, from_address: String) -> Self {
        Self { from_address }
    }

    #[tracing::instrument(skip(self, template), fields(to = %to_email, subject = %template.subject))]
    #[cfg(not(feature = "mock-email"))]
    pub async fn send_email(
        &self,
        to_email: &str,
        template: &EmailTemplate,
    ) -> Result<()> {
        let email = CreateEmailBaseOptions::new(
            &self.from_address,
            [to_email],
            &template.subject,
        )
        .with_html(&template.html_body)
        .with_text(&template.text_body);

        self.client
            .emails
            .send(email)
            .await
            .context("Failed to send email via Resend")?;

        tracing::info!("Email sent successfully");
        Ok(())
    }

    #[tracing::instrument(skip(self, template), fields(to = %to_email, subject = %template.subject))]
    #[cfg(feature = "mock-email")]
    pub async fn send_email(
        &self,
        to_email: &str,
        template: &EmailTemplate,
    ) -> Result<()> {
        tracing::info!(
            "Test mode: Mock email sent to: {} from: {} with subject: {}",
            to_email,
            self.from_address,
            template.subject
        );
        Ok(())
    }
}

/// The user-facing messages the platform sends.
pub mod templates {
    use payloads::RequestStatus;
    use rust_decimal::Decimal;

    use super::EmailTemplate;

    fn simple(subject: &str, paragraphs: &[String]) -> EmailTemplate {
        let html_body = paragraphs
            .iter()
            .map(|p| format!("<p>{p}</p>"))
            .collect::<Vec<_>>()
            .join("\n");
        EmailTemplate {
            subject: subject.to_string(),
            html_body,
            text_body: paragraphs.join("\n\n"),
        }
    }

    pub fn deposit_reviewed(
        amount: Decimal,
        status: RequestStatus,
    ) -> EmailTemplate {
        match status {
            RequestStatus::Confirmed => simple(
                "Deposit confirmed",
                &[format!(
                    "Your deposit of ${amount} has been confirmed and added to your balance."
                )],
            ),
            _ => simple(
                "Deposit declined",
                &[format!(
                    "Your deposit of ${amount} was declined. Contact support if you believe this is a mistake."
                )],
            ),
        }
    }

    pub fn withdrawal_requested(amount: Decimal, method: &str) -> EmailTemplate {
        simple(
            "Withdrawal requested",
            &[format!(
                "We received your request to withdraw ${amount} via {method}. It will be processed shortly."
            )],
        )
    }

    pub fn withdrawal_reviewed(
        amount: Decimal,
        status: RequestStatus,
    ) -> EmailTemplate {
        match status {
            RequestStatus::Confirmed => simple(
                "Withdrawal approved",
                &[format!("Your withdrawal of ${amount} has been sent.")],
            ),
            _ => simple(
                "Withdrawal declined",
                &[format!(
                    "Your withdrawal of ${amount} was declined and the amount has been returned to your balance."
                )],
            ),
        }
    }

    pub fn investment_started(
        plan_name: &str,
        amount: Decimal,
        payout_amount: Decimal,
    ) -> EmailTemplate {
        simple(
            "Investment started",
            &[format!(
                "Your ${amount} investment in the {plan_name} plan is active. \
                 ${payout_amount} will be credited to your balance when it matures."
            )],
        )
    }

    pub fn investment_matured(
        plan_name: &str,
        payout_amount: Decimal,
    ) -> EmailTemplate {
        simple(
            "Investment matured",
            &[format!(
                "Your {plan_name} investment has matured. ${payout_amount} has been added to your balance."
            )],
        )
    }

    pub fn referral_earned(amount: Decimal, kind: &str) -> EmailTemplate {
        simple(
            "Referral profit",
            &[format!(
                "You earned ${amount} in referral commission from a referred {kind}."
            )],
        )
    }

    pub fn bot_purchased(bot_name: &str, price: Decimal) -> EmailTemplate {
        simple(
            "Bot purchased",
            &[format!(
                "Your purchase of the {bot_name} bot for ${price} was successful."
            )],
        )
    }

    pub fn account_deactivated() -> EmailTemplate {
        simple(
            "Account deactivated",
            &["Your account has been deactivated. Contact support for details."
                .to_string()],
        )
    }

}
