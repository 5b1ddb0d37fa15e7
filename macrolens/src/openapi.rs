//! OpenAPI documentation assembled from the `utoipa` handler annotations.

use crate::api::models::analyze::{ErrorResponse, NutritionEstimate};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "macrolens API",
        description = "Upload a food photo, get back a structured nutrition estimate."
    ),
    paths(crate::api::handlers::analyze::analyze),
    components(schemas(NutritionEstimate, ErrorResponse)),
    tags(
        (name = "analyze", description = "Food photo analysis")
    )
)]
pub struct ApiDoc;
