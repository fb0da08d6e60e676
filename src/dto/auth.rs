use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Claims of a bearer token. `sub` is the user id.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}
