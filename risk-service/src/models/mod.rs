pub mod approval;
pub mod capability;
pub mod identity;
pub mod risk_event;
pub mod second_factor;
pub mod session;

pub use approval::{
    ApprovalAction, ApprovalRequest, ApprovalRequestResponse, ApprovalStatus, Decision,
};
pub use capability::{CapabilitySet, Grant};
pub use identity::{Identity, IdentityResponse, Role};
pub use risk_event::{NewRiskEvent, RiskEvent, RiskEventPatch, Severity};
pub use second_factor::{Enrollment, SecondFactorSecret};
pub use session::{ClientMeta, Session, SessionInfo};
