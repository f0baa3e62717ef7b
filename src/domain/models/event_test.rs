use super::GatewayError;
use super::Notice;

#[test]
fn it_maps_gateway_errors() {
    assert_eq!(
        Notice::from_gateway(&GatewayError::RateLimited),
        Notice::RateLimited
    );
    assert_eq!(
        Notice::from_gateway(&GatewayError::PaymentRequired),
        Notice::OutOfCredits
    );
    assert_eq!(
        Notice::from_gateway(&GatewayError::Transport("boom".to_string())),
        Notice::Failed("boom".to_string())
    );
}

#[test]
fn it_marks_only_credit_exhaustion_nonretryable() {
    assert!(Notice::RateLimited.is_retryable());
    assert!(Notice::Failed("boom".to_string()).is_retryable());
    assert!(!Notice::OutOfCredits.is_retryable());
}

#[test]
fn it_renders_retry_wording() {
    insta::assert_snapshot!(Notice::RateLimited.to_string(), @"Too many requests. Please wait a moment and try again.");
}

#[test]
fn it_renders_billing_wording() {
    insta::assert_snapshot!(Notice::OutOfCredits.to_string(), @"The concierge service requires credits. Please contact support.");
}
