//! # API REST
//!
//! REST API implementation for MediLink.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - Cookie-carried sessions and per-request audit recording
//!
//! All domain behaviour lives in `medilink-core`; this crate only maps HTTP
//! requests onto it and core errors back onto status codes.

#![warn(rust_2018_idioms)]

use axum::{
    extract::{Path as AxumPath, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use medilink_core::{
    AuditRecorder, AuthService, CoreConfig, CoreError, CoreResult, Db, DurationType,
    EnrollmentRegistry, MessageCipher, MessageVault, NewPrescription, NoticeBoard,
    PrescriptionLedger, ProfileService, Registration, Role, SessionContext, SessionStore,
    RedemptionOutcome,
};
use medilink_types::{EmailAddress, NonEmptyText};

/// Name of the cookie carrying the opaque session token.
pub const SESSION_COOKIE: &str = "medilink_session";

/// Application state shared across REST API handlers.
///
/// Holds the configuration, session store, and one instance of each core
/// service. Everything inside is cheaply cloneable.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub auth: AuthService,
    pub profiles: ProfileService,
    pub enrollments: EnrollmentRegistry,
    pub vault: MessageVault,
    pub ledger: PrescriptionLedger,
    pub notices: NoticeBoard,
    pub audit: AuditRecorder,
}

impl AppState {
    /// Builds the full service set over an already-opened database.
    pub fn new(cfg: &CoreConfig, db: Arc<Db>) -> Self {
        Self {
            sessions: Arc::new(SessionStore::new(cfg.session_idle_timeout())),
            auth: AuthService::new(db.clone()),
            profiles: ProfileService::new(db.clone()),
            enrollments: EnrollmentRegistry::new(db.clone()),
            vault: MessageVault::new(db.clone(), MessageCipher::new(cfg.message_key())),
            ledger: PrescriptionLedger::new(db.clone()),
            notices: NoticeBoard::new(db),
            audit: AuditRecorder::new(cfg.audit_dir().to_path_buf()),
        }
    }

    fn record_outcome(&self, ctx: Option<&SessionContext>, route: &str, success: bool) {
        self.audit.record(
            ctx.map(|c| c.role),
            ctx.map(|c| c.user_id.as_str()),
            route,
            success,
        );
    }
}

/// Opens the configured database, ensures the schema exists, and builds the
/// application state.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or initialised.
pub fn open_state(cfg: &CoreConfig) -> CoreResult<AppState> {
    let db = Arc::new(Db::open(cfg.db_path())?);
    db.init_schema()?;
    Ok(AppState::new(cfg, db))
}

/// Builds the REST router with all routes, Swagger UI, and CORS.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/login/:role", post(login))
        .route("/register/:role", post(register))
        .route("/logout", get(logout).post(logout))
        .route("/me", get(me))
        .route(
            "/profile/patient/:user_id",
            get(get_patient_profile).put(update_patient_history),
        )
        .route("/profile/:target_role/:user_id", get(get_profile))
        .route("/messages/:patient_id", get(get_messages).post(post_message))
        .route("/prescriptions", post(create_prescription))
        .route(
            "/prescriptions/:id",
            get(get_prescription).delete(redeem_prescription),
        )
        .route("/notices/:patient_id", get(get_notices).post(post_notice))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// REQUEST / RESPONSE SHAPES
// ============================================================================

#[derive(Debug, serde::Serialize, ToSchema)]
pub struct ErrorRes {
    pub error: String,
}

#[derive(Debug, serde::Serialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, serde::Deserialize, ToSchema)]
pub struct LoginReq {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, serde::Serialize, ToSchema)]
pub struct SessionUserRes {
    pub status: String,
    #[schema(value_type = Object)]
    pub user: serde_json::Value,
    pub role: String,
}

#[derive(Debug, serde::Deserialize, ToSchema)]
pub struct RegisterReq {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    /// Patients only, required.
    pub date_of_birth: Option<String>,
    /// Patients only, required: the doctor to enrol with.
    pub doctor_id: Option<String>,
    /// Patients only, optional.
    #[schema(value_type = Option<Object>)]
    pub patient_history: Option<serde_json::Value>,
    /// Doctors only, optional.
    pub specialisation: Option<String>,
}

#[derive(Debug, serde::Serialize, ToSchema)]
pub struct StatusRes {
    pub status: String,
}

#[derive(Debug, serde::Serialize, ToSchema)]
pub struct ProfileRes {
    #[schema(value_type = Object)]
    pub user: serde_json::Value,
    pub role: String,
}

#[derive(Debug, serde::Deserialize, ToSchema)]
pub struct HistoryUpdateReq {
    #[schema(value_type = Option<Object>)]
    pub patient_history: Option<serde_json::Value>,
}

#[derive(Debug, serde::Serialize, ToSchema)]
pub struct HistoryUpdateRes {
    pub updated: usize,
}

#[derive(Debug, serde::Serialize, ToSchema)]
pub struct MessagesRes {
    #[schema(value_type = Vec<Object>)]
    pub messages: Vec<medilink_core::Message>,
}

#[derive(Debug, serde::Deserialize, ToSchema)]
pub struct NewMessageReq {
    pub message: Option<String>,
    pub timestamp: Option<String>,
    /// Which doctor's thread to write to. A patient with exactly one
    /// enrollment may omit this; doctors always write to their own thread.
    pub doctor_id: Option<String>,
}

#[derive(Debug, serde::Serialize, ToSchema)]
pub struct AppendRes {
    pub appended: usize,
}

#[derive(Debug, serde::Serialize, ToSchema)]
pub struct PrescriptionRes {
    #[schema(value_type = Object)]
    pub prescription: serde_json::Value,
}

#[derive(Debug, serde::Deserialize, ToSchema)]
pub struct NewPrescriptionReq {
    pub prescription_id: Option<String>,
    pub patient_id: Option<String>,
    pub pharm_id: Option<String>,
    pub medicine_name: Option<String>,
    pub instructions: Option<String>,
    pub date_prescribed: Option<String>,
    pub duration_type: Option<String>,
    pub collection_code: Option<String>,
}

#[derive(Debug, serde::Serialize, ToSchema)]
pub struct PrescriptionCreatedRes {
    pub prescription_id: String,
}

#[derive(Debug, serde::Deserialize, ToSchema)]
pub struct RedeemReq {
    pub collection_code: Option<String>,
}

#[derive(Debug, serde::Deserialize, ToSchema)]
pub struct NewNoticeReq {
    pub date: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, serde::Serialize, ToSchema)]
pub struct NoticeCreatedRes {
    pub notice_id: String,
}

#[derive(Debug, serde::Serialize, ToSchema)]
pub struct NoticesRes {
    #[schema(value_type = Vec<Object>)]
    pub notices: Vec<medilink_core::Notice>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        login,
        register,
        logout,
        me,
        get_profile,
        get_patient_profile,
        update_patient_history,
        get_messages,
        post_message,
        get_prescription,
        create_prescription,
        redeem_prescription,
        get_notices,
        post_notice,
    ),
    components(schemas(
        ErrorRes,
        HealthRes,
        LoginReq,
        SessionUserRes,
        RegisterReq,
        StatusRes,
        ProfileRes,
        HistoryUpdateReq,
        HistoryUpdateRes,
        MessagesRes,
        NewMessageReq,
        AppendRes,
        PrescriptionRes,
        NewPrescriptionReq,
        PrescriptionCreatedRes,
        RedeemReq,
        NewNoticeReq,
        NoticeCreatedRes,
        NoticesRes,
    ))
)]
struct ApiDoc;

// ============================================================================
// ERROR MAPPING AND SESSION PLUMBING
// ============================================================================

type Rejection = (StatusCode, Json<ErrorRes>);

fn status_for(err: &CoreError) -> StatusCode {
    match err {
        CoreError::Validation(_) | CoreError::InvalidDoctor(_) => StatusCode::BAD_REQUEST,
        CoreError::InvalidCredentials | CoreError::NotAuthenticated => StatusCode::UNAUTHORIZED,
        CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
        CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        CoreError::EmailTaken => StatusCode::CONFLICT,
        CoreError::RegistrationFailed
        | CoreError::CreationFailed
        | CoreError::PasswordHash(_)
        | CoreError::Database(_)
        | CoreError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(err: CoreError) -> Rejection {
    let status = status_for(&err);
    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("internal error: {err:?}");
        "internal error".to_string()
    } else {
        err.to_string()
    };
    (status, Json(ErrorRes { error: message }))
}

fn bad_request(message: impl Into<String>) -> Rejection {
    reject(CoreError::Validation(message.into()))
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, Rejection> {
    value.ok_or_else(|| bad_request(format!("missing field: {field}")))
}

/// Extracts the session token from the request's `Cookie` header.
fn session_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';')
        .filter_map(|part| part.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

fn session_cookie(token: &str) -> (HeaderName, String) {
    (
        header::SET_COOKIE,
        format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly"),
    )
}

fn clear_session_cookie() -> (HeaderName, String) {
    (
        header::SET_COOKIE,
        format!("{SESSION_COOKIE}=; Path=/; HttpOnly; Max-Age=0"),
    )
}

fn require_session(
    state: &AppState,
    headers: &HeaderMap,
    roles: Option<&[Role]>,
) -> Result<SessionContext, Rejection> {
    state
        .sessions
        .require(session_token(headers).as_deref(), roles)
        .map_err(reject)
}

fn profile_to_value(profile: &medilink_core::Profile) -> Result<serde_json::Value, Rejection> {
    serde_json::to_value(profile).map_err(|e| reject(CoreError::Serialization(e)))
}

// ============================================================================
// HANDLERS
// ============================================================================

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API.
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "MediLink REST API is alive".into(),
    })
}

#[utoipa::path(
    post,
    path = "/login/{role}",
    request_body = LoginReq,
    responses(
        (status = 200, description = "Login successful", body = SessionUserRes),
        (status = 400, description = "Missing credentials"),
        (status = 401, description = "Invalid credentials")
    )
)]
/// Authenticates a user against the role's credential table.
///
/// On success the response carries the sanitized profile and a `Set-Cookie`
/// header establishing the session. The password hash never leaves the core.
#[axum::debug_handler]
async fn login(
    State(state): State<AppState>,
    AxumPath(role): AxumPath<String>,
    Json(req): Json<LoginReq>,
) -> Result<(StatusCode, [(HeaderName, String); 1], Json<SessionUserRes>), Rejection> {
    let role = Role::parse(&role).map_err(reject)?;
    let email = required(req.email, "email")?;
    let password = required(req.password, "password")?;
    if email.is_empty() || password.is_empty() {
        return Err(bad_request("missing credentials"));
    }

    let route = format!("/login/{role}");
    match state.auth.authenticate(&email, &password, role) {
        Ok(profile) => {
            state.audit.record(Some(role), Some(profile.user_id()), &route, true);
            let token = state.sessions.create(SessionContext {
                user_id: profile.user_id().to_owned(),
                email: profile.email().to_owned(),
                role,
            });
            Ok((
                StatusCode::OK,
                [session_cookie(&token)],
                Json(SessionUserRes {
                    status: "success".into(),
                    user: profile_to_value(&profile)?,
                    role: role.to_string(),
                }),
            ))
        }
        Err(e) => {
            state.audit.record(Some(role), None, &route, false);
            Err(reject(e))
        }
    }
}

#[utoipa::path(
    post,
    path = "/register/{role}",
    request_body = RegisterReq,
    responses(
        (status = 201, description = "User registered", body = SessionUserRes),
        (status = 400, description = "Invalid or missing fields"),
        (status = 409, description = "Email already registered"),
        (status = 500, description = "Registration failed")
    )
)]
/// Registers a new user.
///
/// Patients must name an existing doctor; the doctor-patient enrollment is
/// created atomically with the user row.
#[axum::debug_handler]
async fn register(
    State(state): State<AppState>,
    AxumPath(role): AxumPath<String>,
    Json(req): Json<RegisterReq>,
) -> Result<(StatusCode, Json<SessionUserRes>), Rejection> {
    let role = Role::parse(&role).map_err(reject)?;

    let name = NonEmptyText::new(required(req.name, "name")?)
        .map_err(|e| bad_request(e.to_string()))?;
    let email = EmailAddress::parse(required(req.email, "email")?)
        .map_err(|e| bad_request(e.to_string()))?;
    let password = NonEmptyText::new(required(req.password, "password")?)
        .map_err(|e| bad_request(e.to_string()))?;

    let registration = Registration {
        name,
        email,
        password,
        date_of_birth: req.date_of_birth,
        doctor_id: req.doctor_id,
        patient_history: req.patient_history,
        specialisation: req.specialisation,
    };

    let route = format!("/register/{role}");
    match state.auth.register(role, registration) {
        Ok(profile) => {
            state.audit.record(Some(role), Some(profile.user_id()), &route, true);
            Ok((
                StatusCode::CREATED,
                Json(SessionUserRes {
                    status: "success".into(),
                    user: profile_to_value(&profile)?,
                    role: role.to_string(),
                }),
            ))
        }
        Err(e) => {
            state.audit.record(Some(role), None, &route, false);
            Err(reject(e))
        }
    }
}

#[utoipa::path(
    get,
    path = "/logout",
    responses(
        (status = 200, description = "Session cleared", body = StatusRes),
        (status = 401, description = "Not authenticated")
    )
)]
/// Destroys the caller's session and clears the cookie.
#[axum::debug_handler]
async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(StatusCode, [(HeaderName, String); 1], Json<StatusRes>), Rejection> {
    let ctx = require_session(&state, &headers, None)?;
    if let Some(token) = session_token(&headers) {
        state.sessions.destroy(&token);
    }
    state.record_outcome(Some(&ctx), "/logout", true);
    Ok((
        StatusCode::OK,
        [clear_session_cookie()],
        Json(StatusRes {
            status: "logged out".into(),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Own sanitized profile", body = ProfileRes),
        (status = 401, description = "Not authenticated")
    )
)]
/// Returns the caller's own sanitized profile.
#[axum::debug_handler]
async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ProfileRes>, Rejection> {
    let ctx = require_session(&state, &headers, None)?;
    let result = state.profiles.get_self(&ctx);
    state.record_outcome(Some(&ctx), "/me", result.is_ok());
    let profile = result.map_err(reject)?;
    Ok(Json(ProfileRes {
        user: profile_to_value(&profile)?,
        role: ctx.role.to_string(),
    }))
}

#[utoipa::path(
    get,
    path = "/profile/{target_role}/{user_id}",
    responses(
        (status = 200, description = "Sanitized profile", body = ProfileRes),
        (status = 400, description = "Unknown role"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Cross-role rule refused the view"),
        (status = 404, description = "No such user")
    )
)]
/// Fetches another user's profile under the cross-role visibility rule.
#[axum::debug_handler]
async fn get_profile(
    State(state): State<AppState>,
    AxumPath((target_role, user_id)): AxumPath<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<ProfileRes>, Rejection> {
    fetch_profile(state, target_role, user_id, headers)
}

#[utoipa::path(
    get,
    path = "/profile/patient/{user_id}",
    responses(
        (status = 200, description = "Sanitized patient profile", body = ProfileRes),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Cross-role rule refused the view"),
        (status = 404, description = "No such patient")
    )
)]
/// Patient-profile variant of the cross-role fetch. Exists as its own route
/// because the same path also accepts `PUT` for history updates.
#[axum::debug_handler]
async fn get_patient_profile(
    State(state): State<AppState>,
    AxumPath(user_id): AxumPath<String>,
    headers: HeaderMap,
) -> Result<Json<ProfileRes>, Rejection> {
    fetch_profile(state, "patient".to_owned(), user_id, headers)
}

fn fetch_profile(
    state: AppState,
    target_role: String,
    user_id: String,
    headers: HeaderMap,
) -> Result<Json<ProfileRes>, Rejection> {
    let ctx = require_session(&state, &headers, None)?;
    let target_role = Role::parse(&target_role).map_err(reject)?;

    let result = state.profiles.get_other(&ctx, target_role, &user_id);
    state.record_outcome(
        Some(&ctx),
        &format!("/profile/{target_role}/{user_id}"),
        result.is_ok(),
    );
    let profile = result.map_err(reject)?;
    Ok(Json(ProfileRes {
        user: profile_to_value(&profile)?,
        role: target_role.to_string(),
    }))
}

#[utoipa::path(
    put,
    path = "/profile/patient/{user_id}",
    request_body = HistoryUpdateReq,
    responses(
        (status = 200, description = "History updated", body = HistoryUpdateRes),
        (status = 400, description = "Missing history payload"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Doctors only"),
        (status = 404, description = "No such patient")
    )
)]
/// Replaces a patient's clinical history. Doctors only.
#[axum::debug_handler]
async fn update_patient_history(
    State(state): State<AppState>,
    AxumPath(user_id): AxumPath<String>,
    headers: HeaderMap,
    Json(req): Json<HistoryUpdateReq>,
) -> Result<Json<HistoryUpdateRes>, Rejection> {
    let ctx = require_session(&state, &headers, Some(&[Role::Doctor]))?;
    let history = required(req.patient_history, "patient_history")?;

    let result = state.profiles.update_patient_history(&ctx, &user_id, &history);
    state.record_outcome(
        Some(&ctx),
        &format!("/profile/patient/{user_id}"),
        result.is_ok(),
    );
    let updated = result.map_err(reject)?;
    Ok(Json(HistoryUpdateRes { updated }))
}

#[utoipa::path(
    get,
    path = "/messages/{patient_id}",
    responses(
        (status = 200, description = "Decrypted message history", body = MessagesRes),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Caller has no access to this history")
    )
)]
/// Returns the patient's decrypted message history.
///
/// Patients read their own history; doctors must be enrolled with the
/// patient.
#[axum::debug_handler]
async fn get_messages(
    State(state): State<AppState>,
    AxumPath(patient_id): AxumPath<String>,
    headers: HeaderMap,
) -> Result<Json<MessagesRes>, Rejection> {
    let ctx = require_session(&state, &headers, None)?;
    let route = format!("/messages/{patient_id}");

    if let Err(e) = check_history_access(&state, &ctx, &patient_id) {
        state.record_outcome(Some(&ctx), &route, false);
        return Err(e);
    }

    let result = state.vault.get_history(&patient_id);
    state.record_outcome(Some(&ctx), &route, result.is_ok());
    let messages = result.map_err(reject)?;
    Ok(Json(MessagesRes { messages }))
}

#[utoipa::path(
    post,
    path = "/messages/{patient_id}",
    request_body = NewMessageReq,
    responses(
        (status = 200, description = "Message appended", body = AppendRes),
        (status = 400, description = "Missing fields or ambiguous thread"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Caller has no access to this history"),
        (status = 404, description = "No matching enrollment")
    )
)]
/// Appends an encrypted message to one doctor-patient thread.
///
/// Doctors write to their own thread with the patient. Patients name the
/// doctor in the body, or omit it when they have exactly one enrollment.
#[axum::debug_handler]
async fn post_message(
    State(state): State<AppState>,
    AxumPath(patient_id): AxumPath<String>,
    headers: HeaderMap,
    Json(req): Json<NewMessageReq>,
) -> Result<Json<AppendRes>, Rejection> {
    let ctx = require_session(&state, &headers, None)?;
    let route = format!("/messages/{patient_id}");

    let result = append_message(&state, &ctx, &patient_id, req);
    state.record_outcome(Some(&ctx), &route, result.is_ok());
    result.map(|appended| Json(AppendRes { appended }))
}

fn append_message(
    state: &AppState,
    ctx: &SessionContext,
    patient_id: &str,
    req: NewMessageReq,
) -> Result<usize, Rejection> {
    let message = required(req.message, "message")?;
    let timestamp = required(req.timestamp, "timestamp")?;

    let doctor_id = match ctx.role {
        Role::Doctor => {
            if !state
                .enrollments
                .is_enrolled(&ctx.user_id, patient_id)
                .map_err(reject)?
            {
                return Err(reject(CoreError::Forbidden(
                    "doctor is not enrolled with this patient".into(),
                )));
            }
            ctx.user_id.clone()
        }
        Role::Patient => {
            if ctx.user_id != patient_id {
                return Err(reject(CoreError::Forbidden(
                    "patients may only write to their own history".into(),
                )));
            }
            match req.doctor_id {
                Some(doctor_id) => doctor_id,
                None => {
                    let mut doctors = state
                        .enrollments
                        .doctors_for_patient(patient_id)
                        .map_err(reject)?;
                    if doctors.len() != 1 {
                        return Err(bad_request(
                            "doctor_id is required when enrolled with more than one doctor",
                        ));
                    }
                    doctors.remove(0)
                }
            }
        }
        Role::Pharmacist => {
            return Err(reject(CoreError::Forbidden(
                "pharmacists have no access to message histories".into(),
            )));
        }
    };

    let appended = state
        .vault
        .append_message(&doctor_id, patient_id, &ctx.user_id, &message, &timestamp)
        .map_err(reject)?;
    if appended == 0 {
        return Err(reject(CoreError::NotFound(format!(
            "no enrollment for patient '{patient_id}'"
        ))));
    }
    Ok(appended)
}

fn check_history_access(
    state: &AppState,
    ctx: &SessionContext,
    patient_id: &str,
) -> Result<(), Rejection> {
    match ctx.role {
        Role::Patient if ctx.user_id == patient_id => Ok(()),
        Role::Patient => Err(reject(CoreError::Forbidden(
            "patients may only read their own history".into(),
        ))),
        Role::Doctor => {
            if state
                .enrollments
                .is_enrolled(&ctx.user_id, patient_id)
                .map_err(reject)?
            {
                Ok(())
            } else {
                Err(reject(CoreError::Forbidden(
                    "doctor is not enrolled with this patient".into(),
                )))
            }
        }
        Role::Pharmacist => Err(reject(CoreError::Forbidden(
            "pharmacists have no access to message histories".into(),
        ))),
    }
}

#[utoipa::path(
    get,
    path = "/prescriptions/{id}",
    responses(
        (status = 200, description = "Role-redacted prescription", body = PrescriptionRes),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "No prescription tied to the caller")
    )
)]
/// Fetches a prescription the caller is party to, redacted for their role.
#[axum::debug_handler]
async fn get_prescription(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    headers: HeaderMap,
) -> Result<Json<PrescriptionRes>, Rejection> {
    let ctx = require_session(&state, &headers, None)?;
    let route = format!("/prescriptions/{id}");

    let result = state.ledger.fetch(&ctx.user_id, ctx.role, &id);
    let view = match result {
        Ok(Some(view)) => {
            state.record_outcome(Some(&ctx), &route, true);
            view
        }
        Ok(None) => {
            state.record_outcome(Some(&ctx), &route, false);
            return Err(reject(CoreError::NotFound(format!("prescription '{id}'"))));
        }
        Err(e) => {
            state.record_outcome(Some(&ctx), &route, false);
            return Err(reject(e));
        }
    };

    let prescription =
        serde_json::to_value(&view).map_err(|e| reject(CoreError::Serialization(e)))?;
    Ok(Json(PrescriptionRes { prescription }))
}

#[utoipa::path(
    post,
    path = "/prescriptions",
    request_body = NewPrescriptionReq,
    responses(
        (status = 201, description = "Prescription created", body = PrescriptionCreatedRes),
        (status = 400, description = "Missing fields"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Doctors only"),
        (status = 500, description = "Creation failed")
    )
)]
/// Issues a prescription. Doctors only; the issuing doctor is the session's.
#[axum::debug_handler]
async fn create_prescription(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<NewPrescriptionReq>,
) -> Result<(StatusCode, Json<PrescriptionCreatedRes>), Rejection> {
    let ctx = require_session(&state, &headers, Some(&[Role::Doctor]))?;

    let new = NewPrescription {
        prescription_id: req.prescription_id,
        patient_id: required(req.patient_id, "patient_id")?,
        doctor_id: ctx.user_id.clone(),
        pharm_id: required(req.pharm_id, "pharm_id")?,
        medicine_name: required(req.medicine_name, "medicine_name")?,
        instructions: req.instructions,
        date_prescribed: required(req.date_prescribed, "date_prescribed")?,
        duration_type: DurationType::parse(&required(req.duration_type, "duration_type")?),
        collection_code: req.collection_code,
    };

    let result = state.ledger.create(new);
    state.record_outcome(Some(&ctx), "/prescriptions", result.is_ok());
    let prescription_id = result.map_err(reject)?;
    Ok((
        StatusCode::CREATED,
        Json(PrescriptionCreatedRes { prescription_id }),
    ))
}

#[utoipa::path(
    delete,
    path = "/prescriptions/{id}",
    request_body = RedeemReq,
    responses(
        (status = 200, description = "Redemption outcome: deleted, code changed, or not redeemed", body = StatusRes),
        (status = 400, description = "Missing collection code"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Pharmacists only")
    )
)]
/// Runs the collection-code redemption state machine.
///
/// Always answers 200 for a well-formed request: a wrong code is a business
/// outcome (`"not redeemed"`), not an error.
#[axum::debug_handler]
async fn redeem_prescription(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    headers: HeaderMap,
    Json(req): Json<RedeemReq>,
) -> Result<Json<StatusRes>, Rejection> {
    let ctx = require_session(&state, &headers, Some(&[Role::Pharmacist]))?;
    let code = required(req.collection_code, "collection_code")?;
    let route = format!("/prescriptions/{id}");

    let result = state.ledger.redeem(&id, &ctx.user_id, &code);
    state.record_outcome(
        Some(&ctx),
        &route,
        matches!(
            &result,
            Ok(RedemptionOutcome::Redeemed | RedemptionOutcome::CodeRotated)
        ),
    );
    let outcome = result.map_err(reject)?;
    let status = match outcome {
        RedemptionOutcome::Redeemed => "deleted",
        RedemptionOutcome::CodeRotated => "code changed",
        RedemptionOutcome::NotRedeemed => "not redeemed",
    };
    Ok(Json(StatusRes {
        status: status.into(),
    }))
}

#[utoipa::path(
    post,
    path = "/notices/{patient_id}",
    request_body = NewNoticeReq,
    responses(
        (status = 201, description = "Notice posted", body = NoticeCreatedRes),
        (status = 400, description = "Missing fields"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Doctors only, enrolled with the patient")
    )
)]
/// Posts a dated notice to one of the doctor's enrolled patients.
#[axum::debug_handler]
async fn post_notice(
    State(state): State<AppState>,
    AxumPath(patient_id): AxumPath<String>,
    headers: HeaderMap,
    Json(req): Json<NewNoticeReq>,
) -> Result<(StatusCode, Json<NoticeCreatedRes>), Rejection> {
    let ctx = require_session(&state, &headers, Some(&[Role::Doctor]))?;
    let date = required(req.date, "date")?;
    let message = required(req.message, "message")?;
    let route = format!("/notices/{patient_id}");

    if !state
        .enrollments
        .is_enrolled(&ctx.user_id, &patient_id)
        .map_err(reject)?
    {
        state.record_outcome(Some(&ctx), &route, false);
        return Err(reject(CoreError::Forbidden(
            "doctor is not enrolled with this patient".into(),
        )));
    }

    let result = state.notices.post(&ctx.user_id, &patient_id, &date, &message);
    state.record_outcome(Some(&ctx), &route, result.is_ok());
    let notice_id = result.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(NoticeCreatedRes { notice_id })))
}

#[utoipa::path(
    get,
    path = "/notices/{patient_id}",
    responses(
        (status = 200, description = "Notices for the patient", body = NoticesRes),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Caller has no access to these notices")
    )
)]
/// Lists a patient's notices. Patients read their own; enrolled doctors may
/// read them too.
#[axum::debug_handler]
async fn get_notices(
    State(state): State<AppState>,
    AxumPath(patient_id): AxumPath<String>,
    headers: HeaderMap,
) -> Result<Json<NoticesRes>, Rejection> {
    let ctx = require_session(&state, &headers, None)?;
    let route = format!("/notices/{patient_id}");

    if let Err(e) = check_history_access(&state, &ctx, &patient_id) {
        state.record_outcome(Some(&ctx), &route, false);
        return Err(e);
    }

    let result = state.notices.list_for_patient(&patient_id);
    state.record_outcome(Some(&ctx), &route, result.is_ok());
    let notices = result.map_err(reject)?;
    Ok(Json(NoticesRes { notices }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body should collect")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("body should be JSON")
    }

    fn test_state() -> (AppState, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = CoreConfig::new(
            temp_dir.path().join("medilink.db"),
            temp_dir.path().join("audit-logs"),
            std::time::Duration::from_secs(60),
            medilink_core::config::DEFAULT_MESSAGE_KEY,
        )
        .expect("config should build");

        let db = Arc::new(Db::in_memory().expect("in-memory database should open"));
        db.init_schema().expect("schema init should succeed");
        (AppState::new(&cfg, db), temp_dir)
    }

    fn register_doctor(state: &AppState) -> medilink_core::Profile {
        state
            .auth
            .register(
                Role::Doctor,
                Registration {
                    name: NonEmptyText::new("Dr. Shoko Ieiri").unwrap(),
                    email: EmailAddress::parse("doctor1@example.com").unwrap(),
                    password: NonEmptyText::new("qwerty").unwrap(),
                    date_of_birth: None,
                    doctor_id: None,
                    patient_history: None,
                    specialisation: Some("Reversed Cursed Technique".into()),
                },
            )
            .expect("doctor registration should succeed")
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request should build")
    }

    #[tokio::test]
    async fn test_login_sets_cookie_and_me_uses_it() {
        let (state, _guard) = test_state();
        register_doctor(&state);
        let app = build_router(state);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/login/doctor",
                serde_json::json!({"email": "doctor1@example.com", "password": "qwerty"}),
            ))
            .await
            .expect("request should run");
        assert_eq!(response.status(), StatusCode::OK);

        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .expect("login should set the session cookie")
            .to_str()
            .unwrap()
            .to_owned();
        assert!(cookie.starts_with(SESSION_COOKIE));

        let body = body_json(response).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["role"], "doctor");
        assert!(body["user"].get("password_hash").is_none());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/me")
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("request should run");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["user"]["email"], "doctor1@example.com");
    }

    #[tokio::test]
    async fn test_me_without_session_is_unauthorized() {
        let (state, _guard) = test_state();
        let app = build_router(state);

        let response = app
            .oneshot(Request::builder().uri("/me").body(Body::empty()).unwrap())
            .await
            .expect("request should run");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_login_with_wrong_password_is_unauthorized() {
        let (state, _guard) = test_state();
        register_doctor(&state);
        let app = build_router(state);

        let response = app
            .oneshot(json_request(
                "POST",
                "/login/doctor",
                serde_json::json!({"email": "doctor1@example.com", "password": "nope"}),
            ))
            .await
            .expect("request should run");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_redeem_wrong_code_is_still_200() {
        let (state, _guard) = test_state();
        let doctor = register_doctor(&state);

        state
            .auth
            .register(
                Role::Patient,
                Registration {
                    name: NonEmptyText::new("Baku Madarame").unwrap(),
                    email: EmailAddress::parse("patient1@example.com").unwrap(),
                    password: NonEmptyText::new("password123").unwrap(),
                    date_of_birth: Some("1970-01-01".into()),
                    doctor_id: Some(doctor.user_id().to_owned()),
                    patient_history: None,
                    specialisation: None,
                },
            )
            .expect("patient registration should succeed");
        let pharmacist = state
            .auth
            .register(
                Role::Pharmacist,
                Registration {
                    name: NonEmptyText::new("MediCare Pharmacy").unwrap(),
                    email: EmailAddress::parse("pharmacy1@example.com").unwrap(),
                    password: NonEmptyText::new("asdfghjkl;").unwrap(),
                    date_of_birth: None,
                    doctor_id: None,
                    patient_history: None,
                    specialisation: None,
                },
            )
            .expect("pharmacist registration should succeed");

        let patient_id = state
            .auth
            .authenticate("patient1@example.com", "password123", Role::Patient)
            .unwrap()
            .user_id()
            .to_owned();
        let prescription_id = state
            .ledger
            .create(NewPrescription {
                prescription_id: None,
                patient_id,
                doctor_id: doctor.user_id().to_owned(),
                pharm_id: pharmacist.user_id().to_owned(),
                medicine_name: "Medicine C".into(),
                instructions: None,
                date_prescribed: "2025-06-30".into(),
                duration_type: DurationType::Temporary,
                collection_code: Some("654321".into()),
            })
            .expect("prescription create should succeed");

        let token = state.sessions.create(SessionContext {
            user_id: pharmacist.user_id().to_owned(),
            email: pharmacist.email().to_owned(),
            role: Role::Pharmacist,
        });
        let app = build_router(state);

        let mut request = json_request(
            "DELETE",
            &format!("/prescriptions/{prescription_id}"),
            serde_json::json!({"collection_code": "000000"}),
        );
        request.headers_mut().insert(
            header::COOKIE,
            format!("{SESSION_COOKIE}={token}").parse().unwrap(),
        );

        let response = app.oneshot(request).await.expect("request should run");
        assert_eq!(response.status(), StatusCode::OK, "wrong code is not a 4xx");
        let body = body_json(response).await;
        assert_eq!(body["status"], "not redeemed");
    }

    #[tokio::test]
    async fn test_notice_to_unenrolled_patient_is_forbidden() {
        let (state, _guard) = test_state();
        let doctor = register_doctor(&state);
        let other_doctor = state
            .auth
            .register(
                Role::Doctor,
                Registration {
                    name: NonEmptyText::new("Dr. Gregory House").unwrap(),
                    email: EmailAddress::parse("doctor2@example.com").unwrap(),
                    password: NonEmptyText::new("password").unwrap(),
                    date_of_birth: None,
                    doctor_id: None,
                    patient_history: None,
                    specialisation: None,
                },
            )
            .expect("doctor registration should succeed");

        // Patient enrols with the first doctor only.
        let patient = state
            .auth
            .register(
                Role::Patient,
                Registration {
                    name: NonEmptyText::new("Takaomi Kaji").unwrap(),
                    email: EmailAddress::parse("patient3@example.com").unwrap(),
                    password: NonEmptyText::new("password789").unwrap(),
                    date_of_birth: Some("1970-03-03".into()),
                    doctor_id: Some(doctor.user_id().to_owned()),
                    patient_history: None,
                    specialisation: None,
                },
            )
            .expect("patient registration should succeed");

        let token = state.sessions.create(SessionContext {
            user_id: other_doctor.user_id().to_owned(),
            email: other_doctor.email().to_owned(),
            role: Role::Doctor,
        });
        let app = build_router(state);

        let mut request = json_request(
            "POST",
            &format!("/notices/{}", patient.user_id()),
            serde_json::json!({"date": "2025-12-11", "message": "Appointment at 10:00 AM."}),
        );
        request.headers_mut().insert(
            header::COOKIE,
            format!("{SESSION_COOKIE}={token}").parse().unwrap(),
        );

        let response = app.oneshot(request).await.expect("request should run");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_session_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_token(&headers), None);

        headers.insert(
            header::COOKIE,
            format!("other=1; {SESSION_COOKIE}=abc123; theme=dark")
                .parse()
                .unwrap(),
        );
        assert_eq!(session_token(&headers).as_deref(), Some("abc123"));
    }
}
