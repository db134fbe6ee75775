use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::error::AppError;
use crate::model::{group::Group, role::Role};
use crate::models::TokenType;
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, web::Data};
use futures::future::{Ready, ready};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,

    /// Present only if this user is linked to an instructor record
    pub instructor_id: Option<u64>,
}

impl AuthUser {
    pub(crate) fn from_bearer(req: &HttpRequest) -> Result<Self, AppError> {
        let token = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .ok_or_else(|| AppError::Unauthorized("Missing token".into()))?;

        let config = req
            .app_data::<Data<Config>>()
            .ok_or(AppError::Internal)?;

        let claims = verify_token(token, &config.jwt_secret)
            .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;

        if claims.token_type != TokenType::Access {
            return Err(AppError::Unauthorized("Not an access token".into()));
        }

        let role = Role::from_id(claims.role)
            .ok_or_else(|| AppError::Unauthorized("Invalid role".into()))?;

        Ok(AuthUser {
            user_id: claims.user_id,
            username: claims.sub,
            role,
            instructor_id: claims.instructor_id,
        })
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(AppError::Forbidden("Admin only".into()))
        }
    }

    pub fn is_instructor(&self) -> bool {
        self.role == Role::Instructor
    }

    /// Admins see every group, instructors only the ones they teach.
    pub fn can_access(&self, group: &Group) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Instructor => self.instructor_id == Some(group.instructor_id),
        }
    }

    pub fn require_access(&self, group: &Group) -> Result<(), AppError> {
        if self.can_access(group) {
            Ok(())
        } else {
            Err(AppError::Forbidden("Not your group".into()))
        }
    }
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // The middleware may already have decoded the token for this request.
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return ready(Ok(user.clone()));
        }

        ready(AuthUser::from_bearer(req).map_err(Into::into))
    }
}
