//! Bearer-token authentication

use crate::error::IntakeError;

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() { return false; }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthMode {
    Token,
    None,
}

#[derive(Clone, Debug)]
pub struct ResolvedAuth {
    pub mode: AuthMode,
    pub token: Option<String>,
}

impl ResolvedAuth {
    /// Token auth when a token is configured, open otherwise.
    pub fn from_token(token: Option<String>) -> Self {
        let token = token.filter(|t| !t.is_empty());
        let mode = if token.is_some() { AuthMode::Token } else { AuthMode::None };
        Self { mode, token }
    }

    pub fn open() -> Self {
        Self { mode: AuthMode::None, token: None }
    }

    pub fn verify_token(&self, provided: Option<&str>) -> Result<(), IntakeError> {
        match self.mode {
            AuthMode::None => Ok(()),
            AuthMode::Token => {
                let expected = self.token.as_deref().ok_or_else(|| IntakeError::unauthorized("no token configured"))?;
                let provided = provided.ok_or_else(|| IntakeError::unauthorized("token required"))?;
                if !constant_time_eq(expected.as_bytes(), provided.as_bytes()) {
                    return Err(IntakeError::unauthorized("invalid token"));
                }
                Ok(())
            }
        }
    }

    /// Check an `Authorization: Bearer <token>` header value.
    pub fn verify_header(&self, header: Option<&str>) -> Result<(), IntakeError> {
        let provided = header.map(|h| h.strip_prefix("Bearer ").unwrap_or(h).trim());
        self.verify_token(provided)
    }
}
