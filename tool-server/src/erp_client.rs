//! Typed client for the ERP service's REST surface, grounded on
//! `original_source/mcp_tools/app/tools/base.py`'s `HTTPClient`.

use std::time::Duration;

use serde_json::Value;

/// Errors raised while talking to the ERP.
#[derive(Debug, thiserror::Error)]
pub enum ErpClientError {
    /// The ERP reported the installment as already paid (400).
    #[error("installment already paid")]
    AlreadyPaid,
    /// Any other non-2xx response or transport failure.
    #[error("erp request failed: {0}")]
    Request(String),
}

/// Singleton-per-process client, fixed 30s timeout, JSON content-type.
#[derive(Clone)]
pub struct ErpClient {
    http: reqwest::Client,
    base_url: String,
}

impl ErpClient {
    /// Builds a client against `base_url` (e.g. `http://localhost:8081`).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http, base_url: base_url.into() }
    }

    /// `get_student_installments(student_id, state?)`. A 404 maps to an
    /// empty list rather than an error.
    ///
    /// # Errors
    ///
    /// Returns [`ErpClientError::Request`] on any non-404 failure.
    pub async fn get_student_installments(
        &self,
        student_id: &str,
        state: Option<&str>,
    ) -> Result<Value, ErpClientError> {
        let mut url = format!("{}/api/v1/students/{student_id}/installments", self.base_url);
        if let Some(state) = state {
            url.push_str("?state=");
            url.push_str(state);
        }
        let response = self.http.get(&url).send().await.map_err(|e| ErpClientError::Request(e.to_string()))?;
        if response.status().as_u16() == 404 {
            return Ok(Value::Array(Vec::new()));
        }
        if !response.status().is_success() {
            return Err(ErpClientError::Request(format!("status {}", response.status())));
        }
        response.json().await.map_err(|e| ErpClientError::Request(e.to_string()))
    }

    /// `get_installment(id)`. A 404 maps to `null`.
    ///
    /// # Errors
    ///
    /// Returns [`ErpClientError::Request`] on any non-404 failure.
    pub async fn get_installment(&self, id: &str) -> Result<Value, ErpClientError> {
        let url = format!("{}/api/v1/installments/{id}", self.base_url);
        let response = self.http.get(&url).send().await.map_err(|e| ErpClientError::Request(e.to_string()))?;
        if response.status().as_u16() == 404 {
            return Ok(Value::Null);
        }
        if !response.status().is_success() {
            return Err(ErpClientError::Request(format!("status {}", response.status())));
        }
        response.json().await.map_err(|e| ErpClientError::Request(e.to_string()))
    }

    /// `confirm_payment(installment_id, amount, method, reference?)`.
    ///
    /// # Errors
    ///
    /// Returns [`ErpClientError::AlreadyPaid`] on a 400 response, or
    /// [`ErpClientError::Request`] on any other failure.
    pub async fn confirm_payment(
        &self,
        installment_id: &str,
        amount: f64,
        method: &str,
        reference: Option<&str>,
    ) -> Result<Value, ErpClientError> {
        let url = format!("{}/api/v1/payments/confirm", self.base_url);
        let body = serde_json::json!({
            "installment_id": installment_id,
            "amount": amount,
            "method": method,
            "reference": reference,
        });
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ErpClientError::Request(e.to_string()))?;
        if response.status().as_u16() == 400 {
            return Err(ErpClientError::AlreadyPaid);
        }
        if !response.status().is_success() {
            return Err(ErpClientError::Request(format!("status {}", response.status())));
        }
        response.json().await.map_err(|e| ErpClientError::Request(e.to_string()))
    }
}
