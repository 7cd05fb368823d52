//! User-facing messages for known external error codes

use crate::client::ClientError;

/// Gateway failure between us and the external system
pub const ERROR_HTTP_502: &str = "ERROR_HTTP_502";
/// Daily API quota exhausted
pub const REQUEST_LIMIT_EXCEEDED: &str = "sf:REQUEST_LIMIT_EXCEEDED";

const ERROR_HTTP_502_MESSAGE: &str = "We are unable to connect to your Salesforce account right \
    now. This is either an issue on the Salesforce side (please check \
    https://status.salesforce.com/current/incidents) or on our side. Please try again later.";

const REQUEST_LIMIT_EXCEEDED_MESSAGE: &str = "Your Salesforce org has limited API calls for a \
    24-hour period. We are unable to connect to your org because this limit has been exceeded. \
    Please try again later or contact your account executive to increase your API limit.";

/// Message for a code with a known explanation
#[must_use]
pub fn message_for_code(code: &str) -> Option<&'static str> {
    match code {
        ERROR_HTTP_502 => Some(ERROR_HTTP_502_MESSAGE),
        REQUEST_LIMIT_EXCEEDED => Some(REQUEST_LIMIT_EXCEEDED_MESSAGE),
        _ => None,
    }
}

/// Message to show the user for a client error
#[must_use]
pub fn user_facing_message(error: &ClientError) -> String {
    error
        .code()
        .and_then(message_for_code)
        .map_or_else(|| error.to_string(), str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_are_mapped() {
        let err = ClientError::api(REQUEST_LIMIT_EXCEEDED, "TotalRequests Limit exceeded.");
        assert!(user_facing_message(&err).starts_with("Your Salesforce org has limited API calls"));
        let err = ClientError::api(ERROR_HTTP_502, "502");
        assert!(user_facing_message(&err).contains("unable to connect"));
    }

    #[test]
    fn unknown_codes_pass_through() {
        let err = ClientError::api("INVALID_TYPE", "no such type");
        assert_eq!(user_facing_message(&err), "request failed with INVALID_TYPE: no such type");
        assert!(message_for_code("OTHER").is_none());
    }
}
