use crate::core::{
    domain::{
        error::{ValidationError, VmmError, VmmResult},
        model::{
            domain_state::DomainState,
            vm::{Vm, VmAction, VmState, VmSummary},
        },
        value_object::{VmId, validate_description},
    },
    infrastructure::{control_plane::ControlPlane, store::VmStore},
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Power actions, small record updates and listings.
pub struct LifecycleService {
    vms: Arc<dyn VmStore>,
    control_plane: Arc<dyn ControlPlane>,
}

impl LifecycleService {
    pub fn new(vms: Arc<dyn VmStore>, control_plane: Arc<dyn ControlPlane>) -> Self {
        Self { vms, control_plane }
    }

    /// Runs a power action on the VM's domain and stamps the record.
    ///
    /// `Start` requires an inactive domain, every other action an active one.
    #[instrument(skip(self))]
    pub async fn perform_action(&self, id: i64, action: VmAction) -> VmmResult<()> {
        let vm = self.load(id).await?;
        let name = vm.vm_id.to_string();
        let domain = self
            .control_plane
            .lookup_domain(&name)
            .await?
            .ok_or_else(|| VmmError::not_found("domain", &name))?;

        let state = self.control_plane.domain_state(&domain).await?;
        let expected = match action {
            VmAction::Start => DomainState::Shutoff,
            _ => DomainState::Running,
        };
        if state.is_active() == (action == VmAction::Start) {
            return Err(VmmError::State {
                vm_id: vm.vm_id,
                expected,
                actual: state,
            });
        }

        match action {
            VmAction::Start => self.control_plane.start(&domain).await?,
            VmAction::Stop => self.control_plane.destroy(&domain).await?,
            VmAction::Shutdown => self.control_plane.shutdown(&domain).await?,
            VmAction::Reboot => self.control_plane.reboot(&domain).await?,
        }
        self.vms.record_power_event(vm.id, action, Utc::now()).await?;

        info!(vm_id = vm.vm_id, "power action completed");
        Ok(())
    }

    /// Replaces the description. An empty text clears it.
    pub async fn update_description(&self, id: i64, description: &str) -> VmmResult<()> {
        validate_description(description)?;
        self.vms.update_description(id, description).await?;
        Ok(())
    }

    pub async fn modify_wake_on_lan(&self, vm_id: u32, enabled: bool) -> VmmResult<()> {
        let vm_id = VmId::new(vm_id)?;
        self.vms.update_wake_on_lan(vm_id.get(), enabled).await?;
        Ok(())
    }

    pub async fn modify_boot_order(
        &self,
        vm_id: u32,
        start_at_boot: bool,
        start_order: i64,
    ) -> VmmResult<()> {
        let vm_id = VmId::new(vm_id)?;
        let order = u32::try_from(start_order)
            .map_err(|_| ValidationError::InvalidBootOrder(start_order))?;
        self.vms
            .update_boot_order(vm_id.get(), start_at_boot, order)
            .await?;
        Ok(())
    }

    /// Every VM with its state derived from the control plane.
    pub async fn list_vms(&self) -> VmmResult<Vec<Vm>> {
        let mut vms = self.vms.list_vms().await?;
        for vm in &mut vms {
            vm.state = self.derive_state(vm.vm_id).await;
        }
        Ok(vms)
    }

    pub async fn simple_list(&self) -> VmmResult<Vec<VmSummary>> {
        Ok(self
            .list_vms()
            .await?
            .into_iter()
            .map(|vm| VmSummary {
                vm_id: vm.vm_id,
                name: vm.name,
                state: vm.state,
            })
            .collect())
    }

    pub async fn get_vm(&self, id: i64) -> VmmResult<Vm> {
        let mut vm = self.load(id).await?;
        vm.state = self.derive_state(vm.vm_id).await;
        Ok(vm)
    }

    async fn load(&self, id: i64) -> VmmResult<Vm> {
        self.vms
            .get_vm(id)
            .await?
            .ok_or_else(|| VmmError::not_found("vm", id))
    }

    async fn derive_state(&self, vm_id: u32) -> VmState {
        let name = vm_id.to_string();
        let state = match self.control_plane.lookup_domain(&name).await {
            Ok(Some(domain)) => self.control_plane.domain_state(&domain).await.map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };

        match state {
            Ok(Some(state)) if state.is_active() => VmState::Active,
            Ok(_) => VmState::Inactive,
            Err(e) => {
                warn!(vm_id, error = %e, "cannot read domain state");
                VmState::Unknown
            }
        }
    }
}
