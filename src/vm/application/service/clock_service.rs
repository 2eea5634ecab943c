use crate::core::{
    domain::{
        error::{DescriptorError, VmmError, VmmResult},
        model::domain_state::{DomainHandle, DomainState},
        value_object::{ClockOffset, VmId},
    },
    infrastructure::{
        control_plane::ControlPlane,
        domain_xml::{inspect_descriptor, set_clock_offset},
        store::VmStore,
    },
};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Changes a VM's clock offset in its persisted domain definition.
pub struct ClockService {
    vms: Arc<dyn VmStore>,
    control_plane: Arc<dyn ControlPlane>,
}

impl ClockService {
    pub fn new(vms: Arc<dyn VmStore>, control_plane: Arc<dyn ControlPlane>) -> Self {
        Self { vms, control_plane }
    }

    /// Sets the clock offset of a shut-off domain and records it on the VM.
    ///
    /// The offset is parsed before any I/O. The patched descriptor is
    /// checked before the current definition is touched. On backends
    /// without atomic redefinition the old definition is removed first and
    /// restored if the new one is refused.
    ///
    /// # Errors
    /// * `VmmError::Validation` for an unknown offset or VM id.
    /// * `VmmError::State` if the domain is not shut off.
    /// * `VmmError::DefinitionLost` if neither definition could be registered.
    #[instrument(skip(self))]
    pub async fn modify_clock(&self, vm_id: u32, offset: &str) -> VmmResult<()> {
        let offset: ClockOffset = offset.parse()?;
        let vm_id = VmId::new(vm_id)?;

        if self.vms.find_vm_by_vm_id(vm_id.get()).await?.is_none() {
            return Err(VmmError::not_found("vm", vm_id));
        }

        let name = vm_id.domain_name();
        let domain = self
            .control_plane
            .lookup_domain(&name)
            .await?
            .ok_or_else(|| VmmError::not_found("domain", &name))?;

        let state = self.control_plane.domain_state(&domain).await?;
        if state != DomainState::Shutoff {
            return Err(VmmError::State {
                vm_id: vm_id.get(),
                expected: DomainState::Shutoff,
                actual: state,
            });
        }

        let original = self.control_plane.descriptor(&domain).await?;
        let patched = set_clock_offset(&original, offset)?;
        check_patched(&original, &patched, &name, offset)?;

        self.redefine(vm_id, &domain, &original, &patched).await?;
        self.vms.update_clock_offset(vm_id.get(), offset).await?;

        info!(%vm_id, offset = %offset, "clock offset updated");
        Ok(())
    }

    async fn redefine(
        &self,
        vm_id: VmId,
        domain: &DomainHandle,
        original: &str,
        patched: &str,
    ) -> VmmResult<()> {
        if self.control_plane.supports_atomic_redefine() {
            self.control_plane.define(patched).await?;
            return Ok(());
        }

        self.control_plane.undefine(domain).await?;
        let refused = match self.control_plane.define(patched).await {
            Ok(_) => return Ok(()),
            Err(e) => e,
        };

        warn!(%vm_id, error = %refused, "new definition refused, restoring the original");
        match self.control_plane.define(original).await {
            Ok(_) => Err(refused.into()),
            Err(restore) => {
                error!(
                    %vm_id,
                    error = %refused,
                    restore_error = %restore,
                    "domain definition lost, manual redefinition required"
                );
                Err(VmmError::DefinitionLost {
                    vm_id: vm_id.get(),
                    message: format!("{refused}; restoring original failed: {restore}"),
                })
            }
        }
    }
}

fn check_patched(
    original: &str,
    patched: &str,
    name: &str,
    offset: ClockOffset,
) -> Result<(), DescriptorError> {
    let before = inspect_descriptor(original)?;
    let after = inspect_descriptor(patched)
        .map_err(|e| DescriptorError::Rejected(e.to_string()))?;

    if after.root != before.root {
        return Err(DescriptorError::Rejected(format!(
            "root changed from {} to {}",
            before.root, after.root
        )));
    }
    if after.name.as_deref() != Some(name) {
        return Err(DescriptorError::Rejected(format!(
            "domain name is {:?}, expected {name}",
            after.name
        )));
    }
    if after.clock_offset.as_deref() != Some(offset.as_str()) {
        return Err(DescriptorError::Rejected("clock offset not applied".to_string()));
    }
    Ok(())
}
