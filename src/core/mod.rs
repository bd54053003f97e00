//! Core module containing the resource model, drivers and the domain layer

pub mod auth;
pub mod driver;
pub mod error;
pub mod events;
pub mod feedback;
pub mod form;
pub mod manager;
pub mod naming;
pub mod operation;
pub mod query;
pub mod request;
pub mod resource;
pub mod validation;

pub use auth::{AuthContext, AuthorizationChecker, AuthorizationGate, GrantAll, RoleChecker};
pub use driver::{Backend, Driver, DriverArgs, DriverKind, DriverSelector, DriverTransaction, ResourceMetadata};
pub use error::{ResourceError, ResourceResult};
pub use events::{EventBus, EventDispatcher, LifecycleListener, LifecyclePhase, ResourceEvent};
pub use feedback::{FeedbackMessage, FeedbackSeverity, FeedbackSink, FlashBag};
pub use form::{FormBinder, FormState, JsonFormBinder};
pub use manager::DomainManager;
pub use operation::{Operation, OperationOutput, OperationResolver};
pub use query::{Criteria, PaginatedResponse, Paginator, SortDirection, Sorting};
pub use request::ResourceRequest;
pub use resource::{Resource, ResourceIdentifier};
pub use validation::FieldRules;
