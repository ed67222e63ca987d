use crate::error::{CallFlowError, Result};

/// Which party a callback was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallLeg {
    /// The inbound call and its dial-outcome callbacks.
    Caller,
    /// The dialed party before it is bridged. The provider reports that leg's
    /// own SID, so the logical call comes from the `parent` we put in the URL.
    DialedParty,
}

pub fn resolve_sid(leg: CallLeg, call_sid: Option<&str>, parent: Option<&str>) -> Result<String> {
    fn non_empty(value: Option<&str>) -> Option<&str> {
        value.map(str::trim).filter(|v| !v.is_empty())
    }
    match leg {
        CallLeg::Caller => non_empty(call_sid)
            .map(str::to_string)
            .ok_or(CallFlowError::MissingParameter("CallSid")),
        CallLeg::DialedParty => non_empty(parent)
            .map(str::to_string)
            .ok_or(CallFlowError::MissingParentCall),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_leg_uses_transport_sid() {
        let sid = resolve_sid(CallLeg::Caller, Some("CA100"), Some("CA999")).unwrap();
        assert_eq!(sid, "CA100");
    }

    #[test]
    fn test_dialed_party_uses_forwarded_parent() {
        let sid = resolve_sid(CallLeg::DialedParty, Some("CA200"), Some("CA100")).unwrap();
        assert_eq!(sid, "CA100");
    }

    #[test]
    fn test_missing_identity_is_rejected() {
        assert!(matches!(
            resolve_sid(CallLeg::Caller, None, Some("CA100")),
            Err(CallFlowError::MissingParameter("CallSid"))
        ));
        assert!(matches!(
            resolve_sid(CallLeg::Caller, Some("  "), None),
            Err(CallFlowError::MissingParameter("CallSid"))
        ));
        assert!(matches!(
            resolve_sid(CallLeg::DialedParty, Some("CA200"), None),
            Err(CallFlowError::MissingParentCall)
        ));
    }

    #[test]
    fn test_sid_is_trimmed() {
        let sid = resolve_sid(CallLeg::Caller, Some(" CA100 "), None).unwrap();
        assert_eq!(sid, "CA100");
        let sid = resolve_sid(CallLeg::DialedParty, None, Some("CA100\n")).unwrap();
        assert_eq!(sid, "CA100");
    }
}
