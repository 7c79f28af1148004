//! Error display for the CLI.

use colored::Colorize;
use consats_director::DirectorError;
use consats_discovery::DiscoveryError;
use consats_poll::PollError;

/// Hint for the first recognized error in the chain.
fn hint(err: &anyhow::Error) -> Option<&'static str> {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<DirectorError>() {
            match e {
                DirectorError::Unauthorized => {
                    return Some("Check CONSATS_BOSH__USERNAME and CONSATS_BOSH__PASSWORD.")
                }
                DirectorError::Network(_) => {
                    return Some("Check that CONSATS_BOSH__TARGET is reachable.")
                }
                DirectorError::UnknownArtifact { .. } => {
                    return Some("Upload the release and stemcell to the director first.")
                }
                _ => {}
            }
        }
        if let Some(PollError::Timeout { .. }) = cause.downcast_ref::<PollError>() {
            return Some("Condition not met in time; raise the timeout or inspect with `consatsctl vms`.");
        }
        if let Some(DiscoveryError::InvalidName { .. }) = cause.downcast_ref::<DiscoveryError>() {
            return Some("Names look like [tag.]service.service.cf.internal.");
        }
    }
    None
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    if let Some(hint) = hint(err) {
        eprintln!("\n{}", format!("Hint: {hint}").yellow());
    }
}
