use crate::{
    InvestmentId, requests,
    responses::{self, Envelope},
};
use reqwest::StatusCode;
use serde::Serialize;

type ReqwestResult = Result<reqwest::Response, reqwest::Error>;

/// An API client for interfacing with the backend.
pub struct APIClient {
    pub address: String,
    pub inner_client: reqwest::Client,
}

/// Helper methods for http actions
impl APIClient {
    fn format_url(&self, path: &str) -> String {
        format!("{}/api/{path}", &self.address)
    }

    async fn post(&self, path: &str, body: &impl Serialize) -> ReqwestResult {
        self.inner_client
            .post(self.format_url(path))
            .json(body)
            .send()
            .await
    }

    async fn empty_post(&self, path: &str) -> ReqwestResult {
        self.inner_client.post(self.format_url(path)).send().await
    }

    async fn put(&self, path: &str, body: &impl Serialize) -> ReqwestResult {
        self.inner_client
            .put(self.format_url(path))
            .json(body)
            .send()
            .await
    }

    async fn empty_put(&self, path: &str) -> ReqwestResult {
        self.inner_client.put(self.format_url(path)).send().await
    }

    async fn empty_get(&self, path: &str) -> ReqwestResult {
        self.inner_client.get(self.format_url(path)).send().await
    }

    async fn empty_delete(&self, path: &str) -> ReqwestResult {
        self.inner_client.delete(self.format_url(path)).send().await
    }
}

/// Methods on the backend API
impl APIClient {
    pub async fn health_check(&self) -> Result<(), ClientError> {
        let response = self.empty_get("health_check").await?;
        ok_empty(response).await
    }

    pub async fn create_account(
        &self,
        details: &requests::CreateAccount,
    ) -> Result<responses::UserProfile, ClientError> {
        let response = self.post("user", details).await?;
        ok_body(response).await
    }

    pub async fn login(
        &self,
        details: &requests::LoginCredentials,
    ) -> Result<(), ClientError> {
        let response = self.post("user/login", details).await?;
        ok_empty(response).await
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        let response = self.empty_post("user/logout").await?;
        ok_empty(response).await
    }

    pub async fn user_profile(
        &self,
    ) -> Result<responses::UserProfile, ClientError> {
        let response = self.empty_get("user").await?;
        ok_body(response).await
    }

    /// Admin only.
    pub async fn update_account(
        &self,
        username: &str,
        details: &requests::UpdateAccount,
    ) -> Result<responses::UserProfile, ClientError> {
        let response =
            self.put(&format!("admin/user/{username}"), details).await?;
        ok_body(response).await
    }

    pub async fn create_deposit(
        &self,
        details: &requests::CreateDeposit,
    ) -> Result<responses::Deposit, ClientError> {
        let response = self.post("deposit", details).await?;
        ok_body(response).await
    }

    pub async fn list_deposits(
        &self,
    ) -> Result<Vec<responses::Deposit>, ClientError> {
        let response = self.empty_get("deposit").await?;
        ok_body(response).await
    }

    pub async fn list_all_deposits(
        &self,
    ) -> Result<Vec<responses::Deposit>, ClientError> {
        let response = self.empty_get("admin/deposit").await?;
        ok_body(response).await
    }

    pub async fn update_deposit(
        &self,
        details: &requests::UpdateDeposit,
    ) -> Result<responses::Deposit, ClientError> {
        let response = self.put("deposit", details).await?;
        ok_body(response).await
    }

    pub async fn create_withdrawal(
        &self,
        details: &requests::CreateWithdrawal,
    ) -> Result<responses::Withdrawal, ClientError> {
        let response = self.post("withdraw", details).await?;
        ok_body(response).await
    }

    pub async fn list_withdrawals(
        &self,
    ) -> Result<Vec<responses::Withdrawal>, ClientError> {
        let response = self.empty_get("withdraw").await?;
        ok_body(response).await
    }

    pub async fn list_all_withdrawals(
        &self,
    ) -> Result<Vec<responses::Withdrawal>, ClientError> {
        let response = self.empty_get("admin/withdraw").await?;
        ok_body(response).await
    }

    pub async fn update_withdrawal(
        &self,
        details: &requests::UpdateWithdrawal,
    ) -> Result<responses::Withdrawal, ClientError> {
        let response = self.put("withdraw", details).await?;
        ok_body(response).await
    }

    pub async fn list_plans(
        &self,
    ) -> Result<Vec<responses::Plan>, ClientError> {
        let response = self.empty_get("plan").await?;
        ok_body(response).await
    }

    pub async fn get_plan(
        &self,
        name: &str,
    ) -> Result<responses::Plan, ClientError> {
        let response = self.empty_get(&format!("plan/{name}")).await?;
        ok_body(response).await
    }

    pub async fn create_plan(
        &self,
        details: &requests::CreatePlan,
    ) -> Result<responses::Plan, ClientError> {
        let response = self.post("plan", details).await?;
        ok_body(response).await
    }

    pub async fn update_plan(
        &self,
        name: &str,
        terms: &requests::PlanTerms,
    ) -> Result<responses::Plan, ClientError> {
        let response = self.put(&format!("plan/{name}"), terms).await?;
        ok_body(response).await
    }

    pub async fn delete_plan(&self, name: &str) -> Result<(), ClientError> {
        let response = self.empty_delete(&format!("plan/{name}")).await?;
        ok_empty(response).await
    }

    pub async fn create_investment(
        &self,
        plan_name: &str,
        details: &requests::CreateInvestment,
    ) -> Result<responses::Investment, ClientError> {
        let response =
            self.post(&format!("invest/{plan_name}"), details).await?;
        ok_body(response).await
    }

    pub async fn list_investments(
        &self,
    ) -> Result<Vec<responses::Investment>, ClientError> {
        let response = self.empty_get("invest").await?;
        ok_body(response).await
    }

    pub async fn list_all_investments(
        &self,
    ) -> Result<Vec<responses::Investment>, ClientError> {
        let response = self.empty_get("admin/invest").await?;
        ok_body(response).await
    }

    /// Admin only. Pays the investment out now if it hasn't been already.
    pub async fn payout_investment(
        &self,
        id: &InvestmentId,
    ) -> Result<responses::PayoutReport, ClientError> {
        let response = self.empty_put(&format!("invest/{id}")).await?;
        ok_body(response).await
    }

    pub async fn list_bots(&self) -> Result<Vec<responses::Bot>, ClientError> {
        let response = self.empty_get("purchase").await?;
        ok_body(response).await
    }

    pub async fn create_bot(
        &self,
        details: &requests::CreateBot,
    ) -> Result<responses::Bot, ClientError> {
        let response = self.post("purchase", details).await?;
        ok_body(response).await
    }

    pub async fn buy_bot(
        &self,
        bot_name: &str,
    ) -> Result<responses::Purchase, ClientError> {
        let response = self.empty_post(&format!("purchase/{bot_name}")).await?;
        ok_body(response).await
    }

    pub async fn list_purchases(
        &self,
    ) -> Result<Vec<responses::Purchase>, ClientError> {
        let response = self.empty_get("user/purchase").await?;
        ok_body(response).await
    }

    pub async fn totals(&self) -> Result<responses::Totals, ClientError> {
        let response = self.empty_get("total").await?;
        ok_body(response).await
    }

    pub async fn referral_earnings(
        &self,
    ) -> Result<responses::ReferralEarnings, ClientError> {
        let response = self.empty_get("referral").await?;
        ok_body(response).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// An unhandled API error to display, containing the envelope message.
    #[error("{1}")]
    APIError(StatusCode, String),
    #[error("Network error. Please check your connection.")]
    Network(#[from] reqwest::Error),
    #[error("Malformed response body")]
    Malformed(#[from] serde_json::Error),
    #[error("Response envelope carried no data")]
    MissingData,
}

/// Unwrap the envelope of a successful response, or return an appropriate
/// error.
pub async fn ok_body<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }
    let envelope = response.json::<Envelope<T>>().await?;
    envelope.data.ok_or(ClientError::MissingData)
}

/// Check that a response is OK, ignoring any data, returning a ClientError
/// if not.
pub async fn ok_empty(response: reqwest::Response) -> Result<(), ClientError> {
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }
    Ok(())
}

async fn api_error(response: reqwest::Response) -> ClientError {
    let status = response.status();
    let text = match response.text().await {
        Ok(text) => text,
        Err(e) => return ClientError::Network(e),
    };
    // fall back to the raw body when the server didn't send an envelope
    let message = serde_json::from_str::<Envelope<serde::de::IgnoredAny>>(
        &text,
    )
    .map(|envelope| envelope.message)
    .unwrap_or(text);
    ClientError::APIError(status, message)
}
