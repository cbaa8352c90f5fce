//! User model and the account forms that create or change one.

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// A registered user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: String,
}

/// A user together with the stores they hearted, as returned by the heart API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserHearts {
    pub id: String,
    pub name: String,
    pub email: String,
    pub hearts: Vec<String>,
}

/// Registration form.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, rename = "password-confirm")]
    pub password_confirm: String,
}

/// Validated registration data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<NewUser, AppError> {
        let mut errors = Vec::new();

        let name = self.name.trim();
        if name.is_empty() {
            errors.push("You must supply a name!".to_string());
        }

        let email = normalize_email(&self.email);
        if email.is_none() {
            errors.push("That Email is not valid!".to_string());
        }

        if self.password.is_empty() {
            errors.push("Password Cannot be Blank!".to_string());
        }
        if self.password_confirm.is_empty() {
            errors.push("Confirmed Password cannot be blank!".to_string());
        }
        if self.password != self.password_confirm {
            errors.push("Oops! Your passwords do not match".to_string());
        }

        match email {
            Some(email) if errors.is_empty() => Ok(NewUser {
                name: name.to_string(),
                email,
                password: self.password.clone(),
            }),
            _ => Err(AppError::Validation(errors)),
        }
    }
}

/// Login form.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Account edit form.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateAccountRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

impl UpdateAccountRequest {
    /// Returns the trimmed name and normalized email.
    pub fn validate(&self) -> Result<(String, String), AppError> {
        let mut errors = Vec::new();

        let name = self.name.trim();
        if name.is_empty() {
            errors.push("You must supply a name!".to_string());
        }
        let email = normalize_email(&self.email);
        if email.is_none() {
            errors.push("That Email is not valid!".to_string());
        }

        match email {
            Some(email) if errors.is_empty() => Ok((name.to_string(), email)),
            _ => Err(AppError::Validation(errors)),
        }
    }
}

/// Forgot-password form.
#[derive(Debug, Clone, Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub email: String,
}

/// Password reset form.
#[derive(Debug, Clone, Deserialize)]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub password: String,
    #[serde(default, rename = "password-confirm")]
    pub password_confirm: String,
}

impl ResetPasswordRequest {
    pub fn validate(&self) -> Result<&str, AppError> {
        if self.password.is_empty() {
            return Err(AppError::validation("Password Cannot be Blank!"));
        }
        if self.password != self.password_confirm {
            return Err(AppError::validation("Passwords do not match!"));
        }
        Ok(&self.password)
    }
}

/// Trim and lower-case an email, rejecting anything that is clearly not one.
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    let (local, domain) = email.split_once('@')?;

    let valid = !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split('.')
            .filter(|part| !part.is_empty())
            .count()
            >= 2
        && !domain.starts_with('.')
        && !domain.ends_with('.');

    valid.then_some(email)
}
