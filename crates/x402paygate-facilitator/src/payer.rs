//! Recovering the payer address when the facilitator's verify response
//! omits one.
//!
//! A missing payer must never fail the payment -- it's recorded as
//! `"unknown"` and the pipeline proceeds.

use x402paygate_types::proto::SchemePayload;

/// Extracts a payer address, preferring the facilitator's own answer, then
/// falling back to a fixed search order through the inner scheme payload.
pub fn resolve_payer(facilitator_payer: Option<&str>, payload: &SchemePayload) -> String {
    if let Some(payer) = facilitator_payer {
        return payer.to_string();
    }
    for pointer in ["/from", "/authorization/from", "/sender", "/payer"] {
        if let Some(value) = payload.pointer(pointer).and_then(|v| v.as_str()) {
            return value.to_string();
        }
    }
    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prefers_facilitator_payer() {
        let payload = json!({"from": "0xFromField"});
        assert_eq!(resolve_payer(Some("0xFacilitator"), &payload), "0xFacilitator");
    }

    #[test]
    fn falls_back_through_search_order() {
        assert_eq!(resolve_payer(None, &json!({"from": "0xA"})), "0xA");
        assert_eq!(
            resolve_payer(None, &json!({"authorization": {"from": "0xB"}})),
            "0xB"
        );
        assert_eq!(resolve_payer(None, &json!({"sender": "0xC"})), "0xC");
        assert_eq!(resolve_payer(None, &json!({"payer": "0xD"})), "0xD");
    }

    #[test]
    fn defaults_to_unknown() {
        assert_eq!(resolve_payer(None, &json!({})), "unknown");
    }
}
