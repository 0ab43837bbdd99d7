//! Google Sheets backend for the ledger.
//!
//! Authenticates as a service account: a signed RS256 JWT is exchanged for a
//! short-lived access token, cached until shortly before expiry. Rows are
//! inserted with a `batchUpdate` `insertDimension` request followed by a RAW
//! values write.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::ServiceError;
use crate::core::ledger::{Ledger, PersistenceError};
use crate::core::retry::{with_retry, RetryPolicy};
use crate::domain::{Column, LedgerRow};

const SHEETS_API_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime requested for the signed assertion
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Refresh the access token this long before it expires
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Fields used from a service-account key file
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Body of `values.get` / `values.update`
#[derive(Debug, Default, Serialize, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

/// Ledger stored in a Google Sheets spreadsheet
pub struct SheetsLedger {
    http: reqwest::Client,
    key: ServiceAccountKey,
    spreadsheet_id: String,
    /// Numeric sheet (tab) id used by `insertDimension`
    sheet_id: i64,
    /// Optional tab name prefixed to A1 ranges
    sheet_name: Option<String>,
    base_url: String,
    retry_policy: RetryPolicy,
    token: Mutex<Option<AccessToken>>,
}

impl SheetsLedger {
    /// Create a ledger from the service-account key JSON
    pub fn from_service_account_json(
        key_json: &str,
        spreadsheet_id: impl Into<String>,
    ) -> Result<Self> {
        let key: ServiceAccountKey =
            serde_json::from_str(key_json).context("Invalid service account JSON")?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            key,
            spreadsheet_id: spreadsheet_id.into(),
            sheet_id: 0,
            sheet_name: None,
            base_url: SHEETS_API_URL.to_string(),
            retry_policy: RetryPolicy::default(),
            token: Mutex::new(None),
        })
    }

    pub fn with_sheet(mut self, sheet_id: i64, sheet_name: Option<String>) -> Self {
        self.sheet_id = sheet_id;
        self.sheet_name = sheet_name.filter(|name| !name.trim().is_empty());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// A1 range, qualified with the tab name when one is configured
    fn range(&self, a1: &str) -> String {
        match &self.sheet_name {
            Some(name) => format!("'{}'!{}", name.replace('\'', "''"), a1),
            None => a1.to_string(),
        }
    }

    fn values_url(&self, a1: &str) -> String {
        format!(
            "{}/{}/values/{}",
            self.base_url,
            self.spreadsheet_id,
            self.range(a1)
        )
    }

    fn batch_update_url(&self) -> String {
        format!("{}/{}:batchUpdate", self.base_url, self.spreadsheet_id)
    }

    /// Signed JWT assertion for the token exchange
    fn sign_assertion(&self, now: DateTime<Utc>) -> Result<String, ServiceError> {
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: SHEETS_SCOPE,
            aud: &self.key.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };

        let key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| ServiceError::Rejected(format!("Invalid service account key: {}", e)))?;

        encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| ServiceError::Rejected(format!("Failed to sign assertion: {}", e)))
    }

    /// Cached access token, refreshed when close to expiry
    async fn access_token(&self) -> Result<String, ServiceError> {
        let mut cached = self.token.lock().await;
        let now = Utc::now();

        if let Some(token) = cached.as_ref() {
            if token.expires_at - chrono::Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) > now {
                return Ok(token.value.clone());
            }
        }

        debug!(account = %self.key.client_email, "Requesting Sheets access token");

        let assertion = self.sign_assertion(now)?;
        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status("Google OAuth", status, &body));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Malformed(format!("Unexpected token response: {}", e)))?;

        let value = token.access_token.clone();
        *cached = Some(AccessToken {
            value: token.access_token,
            expires_at: now + chrono::Duration::seconds(token.expires_in),
        });
        Ok(value)
    }

    /// Send an authorized request and decode the JSON body
    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ServiceError> {
        let token = self.access_token().await?;
        let response = request.bearer_auth(token).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status("Sheets", status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| ServiceError::Malformed(format!("Unexpected Sheets response: {}", e)))
    }

    async fn get_values(&self, a1: &str) -> Result<ValueRange, ServiceError> {
        with_retry(&self.retry_policy, "sheets_get", || {
            self.execute(self.http.get(self.values_url(a1)))
        })
        .await
    }

    async fn put_values(&self, a1: &str, cells: Vec<String>) -> Result<(), ServiceError> {
        let body = ValueRange {
            values: vec![cells.into_iter().map(serde_json::Value::String).collect()],
        };

        with_retry(&self.retry_policy, "sheets_update", || {
            let request = self
                .http
                .put(self.values_url(a1))
                .query(&[("valueInputOption", "RAW")])
                .json(&body);
            async move {
                let _: serde_json::Value = self.execute(request).await?;
                Ok::<(), ServiceError>(())
            }
        })
        .await
    }
}

/// `insertDimension` request for one row at zero-based `index`
fn insert_row_request(sheet_id: i64, index: usize) -> serde_json::Value {
    serde_json::json!({
        "requests": [{
            "insertDimension": {
                "range": {
                    "sheetId": sheet_id,
                    "dimension": "ROWS",
                    "startIndex": index,
                    "endIndex": index + 1,
                },
                "inheritFromBefore": false,
            }
        }]
    })
}

/// First cell of each returned row; omitted and blank rows read as `""`
fn column_cells(range: ValueRange) -> Vec<String> {
    range
        .values
        .into_iter()
        .map(|row| row.into_iter().next().map(cell_text).unwrap_or_default())
        .collect()
}

fn cell_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Ledger for SheetsLedger {
    async fn read_column(&self, column: Column) -> Result<Vec<String>, PersistenceError> {
        let letter = column.letter();
        let range = self.get_values(&format!("{}2:{}", letter, letter)).await?;
        Ok(column_cells(range))
    }

    async fn insert_at(&self, index: usize, row: &LedgerRow) -> Result<(), PersistenceError> {
        if index == 0 {
            return Err(PersistenceError::InvalidInsertIndex(index));
        }

        // Not retried: a lost response would insert a second blank row
        let request = self
            .http
            .post(self.batch_update_url())
            .json(&insert_row_request(self.sheet_id, index));
        let _: serde_json::Value = self.execute(request).await?;

        let row_number = index + 1;
        self.put_values(&format!("A{}:H{}", row_number, row_number), row.to_cells())
            .await?;

        debug!(row = row_number, candidate = %row.candidate_id, "Ledger row inserted");
        Ok(())
    }

    async fn read_cell(&self, row: usize, column: Column) -> Result<String, PersistenceError> {
        let range = self.get_values(&format!("{}{}", column.letter(), row)).await?;
        Ok(column_cells(range).into_iter().next().unwrap_or_default())
    }

    async fn write_cell(
        &self,
        row: usize,
        column: Column,
        value: &str,
    ) -> Result<(), PersistenceError> {
        self.put_values(&format!("{}{}", column.letter(), row), vec![value.to_string()])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_JSON: &str = r#"{
        "type": "service_account",
        "client_email": "ledger@project.iam.gserviceaccount.com",
        "private_key": "not a pem"
    }"#;

    fn ledger() -> SheetsLedger {
        SheetsLedger::from_service_account_json(KEY_JSON, "sheet123").unwrap()
    }

    #[test]
    fn test_key_defaults_token_uri() {
        let ledger = ledger();
        assert_eq!(ledger.key.token_uri, DEFAULT_TOKEN_URI);
        assert_eq!(ledger.key.client_email, "ledger@project.iam.gserviceaccount.com");
    }

    #[test]
    fn test_invalid_key_json_is_rejected() {
        assert!(SheetsLedger::from_service_account_json("{}", "sheet123").is_err());
    }

    #[test]
    fn test_ranges() {
        let ledger = ledger();
        assert_eq!(
            ledger.values_url("F2:F"),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet123/values/F2:F"
        );

        let ledger = ledger.with_sheet(42, Some("Bob's Papers".to_string()));
        assert_eq!(ledger.range("G2:G"), "'Bob''s Papers'!G2:G");
        assert_eq!(ledger.sheet_id, 42);

        let ledger = ledger.with_sheet(0, Some("  ".to_string()));
        assert_eq!(ledger.range("A2"), "A2");
    }

    #[test]
    fn test_insert_row_request_shape() {
        let body = insert_row_request(7, 3);
        let insert = &body["requests"][0]["insertDimension"];

        assert_eq!(insert["range"]["sheetId"], 7);
        assert_eq!(insert["range"]["dimension"], "ROWS");
        assert_eq!(insert["range"]["startIndex"], 3);
        assert_eq!(insert["range"]["endIndex"], 4);
        assert_eq!(insert["inheritFromBefore"], false);
    }

    #[test]
    fn test_column_cells_fills_blank_rows() {
        let range: ValueRange =
            serde_json::from_str(r#"{"range": "F2:F5", "values": [["a"], [], [3], ["d"]]}"#)
                .unwrap();
        assert_eq!(column_cells(range), vec!["a", "", "3", "d"]);

        let empty: ValueRange = serde_json::from_str(r#"{"range": "F2:F"}"#).unwrap();
        assert!(column_cells(empty).is_empty());
    }

    #[test]
    fn test_bad_private_key_is_rejected_before_network() {
        let err = ledger().sign_assertion(Utc::now()).unwrap_err();
        assert!(matches!(err, ServiceError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_insert_above_header_is_rejected() {
        let row = LedgerRow::from_cells(&[]);
        let result = ledger().insert_at(0, &row).await;
        assert!(matches!(result, Err(PersistenceError::InvalidInsertIndex(0))));
    }
}
