use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::request::{Actor, RequestId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommentId(pub i64);

/// An append-only note attached to a request. Ordered per request by id;
/// never mutated or deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub request_id: RequestId,
    pub author: Actor,
    pub text: String,
    pub created_at: DateTime<Utc>,
}
