//! seL4 syscall personality

use kaal_ipc::backend::sel4::{Sel4Ipc, Sel4Syscalls};
use kaal_ipc::{Handle, KernelError, Registers, Word};

use crate::kernel::{Delivered, Delivery};
use crate::thread::MockThread;

fn load(ipc: &mut Sel4Ipc, delivery: Delivery) {
    ipc.clear();
    ipc.set_mrs(&delivery.words);
    for item in delivery.items {
        match item {
            Delivered::Owned { label, .. } => ipc.deliver_unwrapped(label),
            Delivered::Landed { .. } => ipc.deliver_transferred(),
        }
    }
}

impl Sel4Syscalls for MockThread {
    fn cspace_alloc(&self) -> Result<Handle, KernelError> {
        self.alloc_handle()
    }

    fn cspace_free(&self, slot: Handle) {
        self.free_handle(slot)
    }

    fn cnode_delete(&self, slot: Handle) {
        self.clear_handle(slot)
    }

    fn call(&self, dest: Handle, ipc: &mut Sel4Ipc, recv_slots: &[Handle]) -> Result<(), KernelError> {
        let delivery = self.call_endpoint(
            dest,
            ipc.words().to_vec(),
            ipc.transfers().collect(),
            recv_slots,
        )?;
        load(ipc, delivery);
        Ok(())
    }

    fn reply_recv(&self, ipc: &mut Sel4Ipc, reply: bool, recv_slots: &[Handle]) -> Result<Word, KernelError> {
        if reply {
            if let Err(err) = self.reply_to_caller(ipc.words().to_vec(), ipc.transfers().collect()) {
                log::debug!("mock sel4: reply failed: {}", err);
            }
        } else {
            self.drop_caller();
        }

        let (badge, delivery) = self.wait_endpoint(recv_slots)?;
        load(ipc, delivery);
        Ok(badge)
    }
}
