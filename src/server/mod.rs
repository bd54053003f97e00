//! HTTP-facing layer: the resource controller, response composition and the axum adapter

pub mod controller;
pub mod response;
pub mod routes;

pub use controller::{AuthResolver, ResourceController, ResourceControllerBuilder, header_auth_resolver};
pub use response::{
    ResourceResponse, ResponseComposer, RouteUrlGenerator, TeraRenderer, UrlGenerator,
    ViewRenderer, error_response,
};
pub use routes::{ResourceDescriptor, ResourceRegistry};
