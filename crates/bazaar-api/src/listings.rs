use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};

use bazaar_types::api::{CreateListingRequest, DeleteResponse, UpdateListingRequest};
use bazaar_types::models::{Category, ListingChanges, NewListing};

use crate::auth::{AppState, with_db};
use crate::error::ApiError;
use crate::middleware::Caller;

const NOT_FOUND_OR_DENIED: &str = "Listing not found or permission denied.";
const MISSING_ID: &str = "Listing ID is required.";

/// GET /listings: every listing, newest first.
pub async fn list_listings(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let listings = with_db(&state, "fetch listings", |db| db.list_listings()).await?;
    Ok(Json(listings))
}

/// POST /listings
pub async fn create_listing(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<CreateListingRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    let new = validate_new_listing(req, &caller)?;

    let listing = with_db(&state, "create listing", move |db| db.insert_listing(&new)).await?;
    info!(listing_id = %listing.id, seller = %listing.seller_email, "Listing created");

    Ok((StatusCode::CREATED, Json(listing)))
}

/// GET /listings/{id}
pub async fn get_listing(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = require_id(id)?;

    let lookup = id.clone();
    let listing = with_db(&state, "fetch listing", move |db| db.get_listing(&lookup))
        .await?
        .ok_or_else(|| ApiError::NotFound("Listing not found.".into()))?;

    Ok(Json(listing))
}

/// PUT /listings/{id}: partial update, restricted to the listing's seller.
pub async fn update_listing(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<UpdateListingRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = require_id(id)?;
    let Json(req) = body?;
    let changes = validate_changes(req)?;

    let owner = caller.email().map(str::to_string);
    let lookup = id.clone();
    let updated = with_db(&state, "update listing", move |db| {
        db.update_listing(&lookup, &changes, owner.as_deref())
    })
    .await?;

    match updated {
        Some(listing) => {
            info!(listing_id = %listing.id, "Listing updated");
            Ok(Json(listing))
        }
        None => {
            warn!(listing_id = %id, caller = ?caller.email(), "Update matched no listing");
            Err(ApiError::NotFound(NOT_FOUND_OR_DENIED.into()))
        }
    }
}

/// DELETE /listings/{id}: restricted to the listing's seller.
pub async fn delete_listing(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    let id = require_id(id)?;

    let owner = caller.email().map(str::to_string);
    let lookup = id.clone();
    let removed = with_db(&state, "delete listing", move |db| {
        db.delete_listing(&lookup, owner.as_deref())
    })
    .await?;

    if !removed {
        warn!(listing_id = %id, caller = ?caller.email(), "Delete matched no listing");
        return Err(ApiError::NotFound(NOT_FOUND_OR_DENIED.into()));
    }

    info!(listing_id = %id, "Listing deleted");
    Ok(Json(DeleteResponse {
        message: "Listing deleted successfully.".into(),
    }))
}

/// `/listings/` with an empty id segment.
pub async fn missing_id() -> ApiError {
    ApiError::invalid(MISSING_ID)
}

fn require_id(id: String) -> Result<String, ApiError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ApiError::invalid(MISSING_ID));
    }
    Ok(id.to_string())
}

/// Drops blank strings so that `""` counts as missing. Values are kept as
/// sent otherwise.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_category(raw: &str) -> Result<Category, ApiError> {
    raw.parse().map_err(|_| {
        let allowed: Vec<&str> = Category::ALL.iter().map(Category::as_str).collect();
        ApiError::invalid(format!(
            "Unknown category '{}'. Expected one of: {}.",
            raw,
            allowed.join(", ")
        ))
    })
}

fn check_price(price: f64) -> Result<f64, ApiError> {
    if !price.is_finite() || price < 0.0 {
        return Err(ApiError::invalid("Price must be a non-negative number."));
    }
    Ok(price)
}

fn validate_new_listing(req: CreateListingRequest, caller: &Caller) -> Result<NewListing, ApiError> {
    let seller_email = caller.acting_email("seller_email", req.seller_email)?;

    let (Some(title), Some(price), Some(category), Some(seller_email)) =
        (present(req.title), req.price, present(req.category), seller_email)
    else {
        return Err(ApiError::invalid(
            "Missing required fields (title, price, category, seller_email).",
        ));
    };

    Ok(NewListing {
        title,
        description: req.description,
        price: check_price(price)?,
        category: parse_category(&category)?,
        seller_email,
        image_url: req.image_url,
        location: req.location,
    })
}

fn validate_changes(req: UpdateListingRequest) -> Result<ListingChanges, ApiError> {
    let title = match req.title {
        Some(title) if title.trim().is_empty() => return Err(ApiError::invalid("Title cannot be empty.")),
        title => title,
    };

    let changes = ListingChanges {
        title,
        description: req.description,
        price: req.price.map(check_price).transpose()?,
        category: req.category.as_deref().map(parse_category).transpose()?,
        image_url: req.image_url,
        location: req.location,
    };

    if changes.is_empty() {
        return Err(ApiError::invalid("No fields provided for update."));
    }
    Ok(changes)
}
