//! Login and log-session request and response bodies

use serde::{Deserialize, Serialize};

/// Response of `POST /user/Login`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoginResponse {
    pub status: String,

    #[serde(default)]
    pub jwt: Option<String>,

    #[serde(default, rename = "expireMins")]
    pub expire_minutes: Option<i64>,

    /// Failure reason when `status` is not "ok"
    #[serde(default)]
    pub error: Option<String>,
}

impl LoginResponse {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Body of `POST /user/Login`
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest<'a> {
    pub mobile_or_email: &'a str,
    pub password: &'a str,
}

/// Response of `POST /mqtt2/user/LogSessionStart`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSession {
    pub status: String,

    #[serde(default)]
    pub installation_id: Option<i64>,

    #[serde(default)]
    pub archive_saved: bool,
}

/// Body of `POST /mqtt2/user/LogSessionStart`
#[derive(Serialize)]
pub struct LogSessionRequest<'a> {
    #[serde(rename = "i")]
    pub installation_id: i64,
    pub jwt: &'a str,
}
