use axum::{
    Extension, Json,
    extract::{Query, State, rejection::{JsonRejection, QueryRejection}},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use bazaar_types::api::{CreateMessageRequest, MessageQuery};
use bazaar_types::models::NewMessage;

use crate::auth::{AppState, with_db};
use crate::error::ApiError;
use crate::middleware::Caller;

/// GET /messages?listing_id=: conversation for one listing, oldest first.
/// Without a `listing_id` every message is returned.
pub async fn get_messages(
    State(state): State<AppState>,
    query: Result<Query<MessageQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let listing_id = query.listing_id.filter(|id| !id.trim().is_empty());

    let messages = with_db(&state, "fetch messages", move |db| {
        db.list_messages(listing_id.as_deref())
    })
    .await?;

    Ok(Json(messages))
}

/// POST /messages
pub async fn send_message(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<CreateMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    let new = validate_new_message(req, &caller)?;

    let message = with_db(&state, "send message", move |db| db.insert_message(&new)).await?;
    info!(message_id = %message.id, listing_id = %message.listing_id, "Message stored");

    Ok((StatusCode::CREATED, Json(message)))
}

fn validate_new_message(req: CreateMessageRequest, caller: &Caller) -> Result<NewMessage, ApiError> {
    let non_blank = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

    let buyer_email = caller.acting_email("buyer_email", req.buyer_email)?;

    match (non_blank(req.listing_id), buyer_email, non_blank(req.seller_email), non_blank(req.message)) {
        (Some(listing_id), Some(buyer_email), Some(seller_email), Some(message)) => Ok(NewMessage {
            listing_id,
            buyer_email,
            seller_email,
            message,
        }),
        _ => Err(ApiError::invalid(
            "Missing required fields (listing_id, buyer_email, seller_email, message).",
        )),
    }
}
