use crate::auth::auth::AuthUser;
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, ResponseError,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
};
use tracing::debug;

/// Guards the API scope: requests without a valid access token are answered
/// here, the rest carry their [`AuthUser`] in the request extensions.
pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let user = match AuthUser::from_bearer(req.request()) {
        Ok(user) => user,
        Err(e) => {
            debug!(path = %req.path(), reason = %e, "Rejected request");
            return Ok(req.into_response(e.error_response()));
        }
    };

    req.extensions_mut().insert(user);

    next.call(req).await
}
