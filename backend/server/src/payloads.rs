//! Request bodies. Every field is optional on the wire so a missing field becomes a
//! `Validation` error with a useful message instead of a generic parse failure.
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::{
    error::AppError,
    models::Role,
    utils::{required_secret, required_text},
};

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email pattern"));

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReservationRequest {
    pub owner_id: Option<i64>,
    pub numbers: Option<Vec<u32>>,
    pub total_amount: Option<Decimal>,
}

pub struct Reservation {
    pub owner_id: i64,
    pub numbers: Vec<u32>,
    pub total_amount: Decimal,
}

impl ReservationRequest {
    pub fn validate(self) -> Result<Reservation, AppError> {
        let incomplete = || AppError::validation("Incomplete data");

        let owner_id = self.owner_id.ok_or_else(incomplete)?;
        let numbers = self.numbers.filter(|n| !n.is_empty()).ok_or_else(incomplete)?;
        let total_amount = self.total_amount.ok_or_else(incomplete)?;

        Ok(Reservation {
            owner_id,
            numbers,
            total_amount,
        })
    }
}

#[derive(Deserialize, Default)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
}

pub struct NewUser {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

impl RegisterRequest {
    pub fn validate(self) -> Result<NewUser, AppError> {
        Ok(NewUser {
            name: required_text(self.name, "name")?,
            phone: required_text(self.phone, "phone")?,
            email: email(self.email)?,
            password: required_secret(self.password, "password")?,
            role: self.role.unwrap_or_default(),
        })
    }
}

#[derive(Deserialize, Default)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(self) -> Result<Credentials, AppError> {
        Ok(Credentials {
            email: email(self.email)?,
            password: required_secret(self.password, "password")?,
        })
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: Option<String>,
    pub new_password: Option<String>,
}

impl ResetPasswordRequest {
    pub fn validate(self) -> Result<Credentials, AppError> {
        Ok(Credentials {
            email: email(self.email)?,
            password: required_secret(self.new_password, "newPassword")?,
        })
    }
}

fn email(value: Option<String>) -> Result<String, AppError> {
    let email = required_text(value, "email")?.to_lowercase();

    if !EMAIL.is_match(&email) {
        return Err(AppError::validation("Invalid email"));
    }

    Ok(email)
}
