use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use canvas_db::Database;
use canvas_mail::{ImapConfig, Ingestor, Mailer};
use canvas_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;
use uuid::Uuid;

use crate::blocking;
use crate::error::ApiError;
use crate::export::Exporter;
use crate::file_store::FileStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub files: FileStore,
    pub ingestor: Ingestor,
    pub imap: ImapConfig,
    pub mailer: Arc<dyn Mailer>,
    pub exporter: Exporter,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();
    let display_name = req.display_name.trim();
    if email.is_empty() || display_name.is_empty() {
        return Err(ApiError::validation("Email and display name are required"));
    }
    if req.password.len() < 8 {
        return Err(ApiError::validation("Password must be at least 8 characters"));
    }

    let db = state.db.clone();
    let display_name = display_name.to_string();
    let new_email = email.clone();
    let id = blocking(move || {
        if db.get_user_by_email(&new_email)?.is_some() {
            return Err(ApiError::Conflict("Email already registered".into()));
        }

        // Hash password with Argon2id
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(req.password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
            .to_string();

        Ok(db.create_user(&new_email, &display_name, &password_hash)?)
    })
    .await?;
    let user_id: Uuid = id.parse().map_err(anyhow::Error::from)?;
    let token = create_token(&state.jwt_secret, user_id, &email)?;

    info!(user_id = %user_id, "User registered");
    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();
    let db = state.db.clone();
    let user = blocking(move || {
        let user = db
            .get_user_by_email(&email)?
            .filter(|u| u.is_active)
            .ok_or(ApiError::Unauthorized)?;

        let parsed_hash = PasswordHash::new(&user.password_hash)
            .map_err(|e| anyhow::anyhow!("stored hash unreadable: {}", e))?;
        Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .map_err(|_| ApiError::Unauthorized)?;
        Ok(user)
    })
    .await?;

    let user_id: Uuid = user.id.parse().map_err(anyhow::Error::from)?;
    let token = create_token(&state.jwt_secret, user_id, &user.email)?;

    Ok(Json(LoginResponse {
        user_id,
        display_name: user.display_name,
        token,
    }))
}

fn create_token(secret: &str, user_id: Uuid, email: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
