use serde::{Deserialize, Serialize};

/// A hosting company that owns one or more physical locations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: i64,
    pub name: String,
}
