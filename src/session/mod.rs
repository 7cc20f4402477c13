//! Verification session for resolving a presale license to a property id

mod captcha;
mod unescape;

pub use captcha::{
    extract_property_id, extract_property_id_from_fragment, parse_verification_response,
    CaptchaSession, VerificationRequest, VerificationResult, SUCCESS_STATUS,
};
pub use unescape::unescape_fragment;
