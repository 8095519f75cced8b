//! Process-wide PRCM instance
//!
//! Platform code resolves the graph once at boot and installs it here so
//! drivers can reach it without threading a reference through every call.

use spin::Once;

use crate::error::{PrcmError, PrcmResult};
use crate::prcm::Prcm;

static PRCM: Once<Prcm> = Once::new();

/// Install the resolved graph. Only the first call wins.
pub fn install(prcm: Prcm) -> PrcmResult<&'static Prcm> {
    let mut installed = false;
    let global = PRCM.call_once(|| {
        installed = true;
        prcm
    });
    if !installed {
        log::warn!("prcm: global instance already installed");
        return Err(PrcmError::AlreadyExists);
    }
    log::info!("prcm: global instance installed");
    Ok(global)
}

/// The installed graph, if any
pub fn get() -> Option<&'static Prcm> {
    PRCM.get()
}
