//! NOVA syscall personality

use kaal_ipc::backend::nova::{Crd, ItemKind, NovaSyscalls, TypedItem, Utcb};
use kaal_ipc::{Handle, KernelError, Registers, Word};

use crate::kernel::{Delivered, Delivery};
use crate::thread::MockThread;

fn delegated(utcb: &Utcb) -> Vec<Handle> {
    utcb.items()
        .iter()
        .filter(|item| item.kind == ItemKind::Delegate)
        .map(|item| item.crd.selector())
        .collect()
}

fn load(utcb: &mut Utcb, delivery: Delivery) {
    utcb.clear();
    utcb.set_untyped(&delivery.words);
    for item in delivery.items {
        let item = match item {
            Delivered::Owned { handle, .. } => TypedItem {
                crd: Crd::obj(handle),
                kind: ItemKind::Translate,
            },
            Delivered::Landed { handle } => TypedItem {
                crd: Crd::obj(handle),
                kind: ItemKind::Delegate,
            },
        };
        utcb.append_item(item);
    }
}

impl NovaSyscalls for MockThread {
    fn sel_alloc(&self) -> Result<Handle, KernelError> {
        self.alloc_handle()
    }

    fn sel_free(&self, sel: Handle) {
        self.free_handle(sel)
    }

    fn revoke(&self, crd: Crd) {
        self.clear_handle(crd.selector())
    }

    fn call(&self, pt: Handle, utcb: &mut Utcb, rcv_window: &[Handle]) -> Result<(), KernelError> {
        let delivery = self.call_endpoint(pt, utcb.words().to_vec(), delegated(utcb), rcv_window)?;
        load(utcb, delivery);
        Ok(())
    }

    fn reply(&self, utcb: &Utcb) -> Result<(), KernelError> {
        self.kernel().enter();
        self.reply_to_caller(utcb.words().to_vec(), delegated(utcb))
    }

    fn wait(&self, utcb: &mut Utcb, rcv_window: &[Handle]) -> Result<Word, KernelError> {
        // Whoever was not answered by now never will be
        self.drop_caller();

        let (portal_id, delivery) = self.wait_endpoint(rcv_window)?;
        load(utcb, delivery);
        Ok(portal_id)
    }
}
