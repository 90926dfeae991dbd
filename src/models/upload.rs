use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::pagination::Timestamped;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Upload {
    pub id: i64,
    pub cid: String,
    pub name: Option<String>,
    pub dag_size: Option<i64>,
    pub created: String,
    pub updated: String,
}

impl Timestamped for Upload {
    fn created(&self) -> &str {
        &self.created
    }

    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadRequest {
    pub cid: String,
    pub name: Option<String>,
    pub dag_size: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RenameUploadRequest {
    pub name: String,
}
