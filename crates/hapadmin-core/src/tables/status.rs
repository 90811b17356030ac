//! Classification of administrative command output.
//!
//! The daemon is silent (or says `Done.`) on success and answers with one of
//! a fixed set of messages on failure.

use std::collections::HashSet;
use std::sync::LazyLock;

const SUCCESS_OUTPUT: &[&str] = &["Done.", ""];

const ERROR_OUTPUT: &[&str] = &[
    "'add acl' expects two parameters: ACL identifier and pattern.",
    "'add map' expects three parameters: map identifier, key and value.",
    "'add' only supports 'map'.",
    "A frontend name is expected.",
    "agent checks are not enabled on this server.",
    "Agent was not configured on this server, cannot enable.",
    "cannot change health on a tracking server.",
    "content-based lookup is only supported with the \"show\" and \"clear\" actions",
    "\"data.<type>\" followed by a value expected",
    "Data type not stored in this table",
    "'del' only supports 'map' or 'acl'.",
    "'disable' only supports 'agent', 'frontend', 'health', and 'server'.",
    "'enable' only supports 'agent', 'frontend', 'health', and 'server'.",
    "Entry currently in use, cannot remove",
    "Expects a maximum input byte rate in kB/s.",
    "Expects an integer value.",
    "Failed to pause frontend, check logs for precise cause.",
    "Failed to resume frontend, check logs for precise cause (port conflict?).",
    "Frontend is already disabled.",
    "Frontend is already enabled.",
    "Frontend was already shut down.",
    "Frontend was previously shut down, cannot disable.",
    "Frontend was previously shut down, cannot enable.",
    "HAProxy was compiled against a version of OpenSSL that doesn't support OCSP stapling.",
    "Health checks are not configured on this server, cannot enable.",
    "Integer value expected.",
    "Invalid key",
    "Invalid timeout value.",
    "Key not found.",
    "Key value expected",
    "Malformed identifier. Please use #<id> or <file>.",
    "Missing ACL identifier.",
    "Missing ACL identifier and/or key.",
    "Missing map identifier.",
    "Missing map identifier and/or key.",
    "No such backend.",
    "No such frontend.",
    "No such server.",
    "No such session (use 'show sess').",
    "No such table",
    "OCSP Response updated!",
    "Optional argument only supports \"data.<store_data_type>\" <operator> <value> and key <key>",
    "Out of memory error.",
    "Proxy is disabled.",
    "Removing keys from ip tables of type other than ip, ipv6, string and integer is not supported",
    "Require and operator among \"eq\", \"ne\", \"le\", \"ge\", \"lt\", \"gt\"",
    "Require a valid integer value to compare against",
    "Require a valid integer value to store",
    "Require 'backend/server'.",
    "Required arguments: <table> \"data.<store_data_type>\" <operator> <value> or <table> key <key>",
    "Session pointer expected (use 'show sess').",
    "'set map' expects three parameters: map identifier, key and value.",
    "'set maxconn' only supports 'frontend' and 'global'.",
    "'set rate-limit connections' only supports 'global'.",
    "'set rate-limit http-compression' only supports 'global'.",
    "'set rate-limit sessions' only supports 'global'.",
    "'set rate-limit ssl-sessions' only supports 'global'.",
    "'set rate-limit' supports 'connections', 'sessions', 'ssl-sessions', and 'http-compression'.",
    "'set server <srv> agent' expects 'up' or 'down'.",
    "'set server <srv> health' expects 'up', 'stopping', or 'down'.",
    "'set server <srv>' only supports 'agent', 'health', 'state', 'weight' add 'addr'.",
    "'set server <srv> state' expects 'ready', 'drain' and 'maint'.",
    "'set ssl ocsp-response' expects response in base64 encoding.",
    "'set ssl ocsp-response' received invalid base64 encoded response.",
    "'set ssl' only supports 'ocsp-response'.",
    "'set timeout' only supports 'cli'.",
    "Showing keys from tables of type other than ip, ipv6, string and integer is not supported",
    "'shutdown' only supports 'frontend', 'session' and 'sessions'.",
    "'shutdown sessions' only supports 'server'.",
    "This ACL is shared with a map containing samples. ",
    "This command expects two parameters: ACL identifier and key.",
    "This command expects two parameters: map identifier and key.",
    "Unable to allocate a new entry",
    "Unknown ACL identifier. Please use #<id> or <file>.",
    "Unknown action",
    "Unknown data type",
    "Unknown map identifier. Please use #<id> or <file>.",
    "Unknown command. Please enter one of the following commands only :",
    "Value out of range.",
    "Missing resolver section identifier.",
    "Can't find resolvers section.",
    "Can't find backend.",
];

static SUCCESS: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| SUCCESS_OUTPUT.iter().copied().collect());

static ERRORS: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| ERROR_OUTPUT.iter().copied().collect());

/// What a command's (consistent) output means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Success,
    /// One of the daemon's documented error messages.
    KnownError,
    /// Anything else; surfaced verbatim.
    UnknownError,
}

pub fn classify(output: &str) -> CommandOutcome {
    if SUCCESS.contains(output) {
        CommandOutcome::Success
    } else if ERRORS.contains(output) {
        CommandOutcome::KnownError
    } else {
        CommandOutcome::UnknownError
    }
}

/// Whether `line` is a documented error message.
pub fn is_error_output(line: &str) -> bool {
    ERRORS.contains(line)
}

/// Which part of a server address a `set server ... addr` changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressChange {
    Address,
    Port,
}

impl AddressChange {
    /// Output prefixes the daemon uses to report success.
    pub fn success_prefixes(self) -> &'static [&'static str] {
        match self {
            Self::Address => &["IP changed from", "no need to change the addr"],
            Self::Port => &[
                "no need to change the addr, port changed from",
                "no need to change the addr, no need to change the port",
            ],
        }
    }

    pub fn succeeded(self, output: &str) -> bool {
        self.success_prefixes()
            .iter()
            .any(|prefix| output.starts_with(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify(""), CommandOutcome::Success);
        assert_eq!(classify("Done."), CommandOutcome::Success);
        assert_eq!(classify("No such server."), CommandOutcome::KnownError);
        assert_eq!(classify("something odd"), CommandOutcome::UnknownError);
    }

    #[test]
    fn test_every_documented_error_is_known() {
        for message in ERROR_OUTPUT {
            assert!(is_error_output(message));
            assert_eq!(classify(message), CommandOutcome::KnownError);
        }
    }

    #[test]
    fn test_address_change_prefixes() {
        assert!(AddressChange::Address.succeeded("IP changed from '10.0.0.1' to '10.0.0.2' by 'stats socket command'"));
        assert!(AddressChange::Address.succeeded("no need to change the addr"));
        assert!(!AddressChange::Address.succeeded("Require 'backend/server'."));
        assert!(AddressChange::Port.succeeded(
            "no need to change the addr, port changed from '80' to '8080' by 'stats socket command'"
        ));
        assert!(!AddressChange::Port.succeeded("IP changed from '10.0.0.1' to '10.0.0.2'"));
    }
}
