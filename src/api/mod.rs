pub mod payments;

use std::sync::Arc;

use crate::database::store::PaymentStore;
use crate::health::HealthChecker;
use crate::services::push_initiator::PushInitiator;
use crate::services::reconciler::Reconciler;
use crate::services::refund::RefundService;
use crate::services::status_verifier::StatusVerifier;

/// Shared handler state
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn PaymentStore>,
    pub initiator: Arc<PushInitiator>,
    pub reconciler: Arc<Reconciler>,
    pub verifier: Arc<StatusVerifier>,
    pub refunds: Arc<RefundService>,
    pub health_checker: HealthChecker,
}
