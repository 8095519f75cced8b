//! # Voltagedomains
//!
//! A voltagedomain is a supply rail. The core only tracks which
//! powerdomains it feeds; scaling the rail is left to the regulator code.

use alloc::vec::Vec;

use crate::error::{PrcmError, PrcmResult};
use crate::powerdomain::Powerdomain;
use crate::prcm::Prcm;
use crate::{PwrdmId, VoltdmId};

/// Static description of a voltagedomain
#[derive(Debug, Clone, Copy)]
pub struct VoltagedomainDesc {
    /// Unique name
    pub name: &'static str,
}

/// A registered voltagedomain
#[derive(Debug)]
pub struct Voltagedomain {
    id: VoltdmId,
    name: &'static str,
    pwrdms: Vec<PwrdmId>,
}

impl Voltagedomain {
    pub(crate) fn new(id: VoltdmId, desc: &VoltagedomainDesc) -> Self {
        Self {
            id,
            name: desc.name,
            pwrdms: Vec::new(),
        }
    }

    pub(crate) fn add_pwrdm(&mut self, pwrdm: PwrdmId) {
        self.pwrdms.push(pwrdm);
    }

    /// Stable handle
    pub fn id(&self) -> VoltdmId {
        self.id
    }

    /// Rail name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Powerdomains fed by this rail
    pub fn pwrdms(&self) -> &[PwrdmId] {
        &self.pwrdms
    }
}

impl Prcm {
    pub(crate) fn vd(&self, id: VoltdmId) -> PrcmResult<&Voltagedomain> {
        self.voltdms.get(id.index()).ok_or(PrcmError::InvalidArgument)
    }

    /// Call `f` on every powerdomain fed by `voltdm`; the first error stops
    /// the walk
    pub fn voltdm_for_each_pwrdm<F>(&self, voltdm: VoltdmId, mut f: F) -> PrcmResult<()>
    where
        F: FnMut(&Powerdomain) -> PrcmResult<()>,
    {
        for &id in &self.vd(voltdm)?.pwrdms {
            f(self.pd(id)?)?;
        }
        Ok(())
    }
}
