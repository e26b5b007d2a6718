use serde::{Deserialize, Serialize};

/// The authenticated principal every bookmark operation is scoped to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub email: String,
}
