//! Host-side record of the script entry points running on the scripting
//! thread (`exec`, `AddObject`, `onWake`). mlua keeps the Lua stack balanced
//! across every call, so nothing here touches the interpreter; the frames
//! only attribute native log lines to the entry point that issued them.

use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Default, Clone)]
pub(crate) struct CallStack {
    labels: Rc<RefCell<Vec<String>>>,
}

impl CallStack {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn depth(&self) -> usize {
        self.labels.borrow().len()
    }

    pub(crate) fn describe(&self) -> String {
        let labels = self.labels.borrow();
        if labels.is_empty() {
            "<host>".to_string()
        } else {
            labels.join(" > ")
        }
    }
}

/// Pushes a frame on creation and cuts the stack back to the depth it saw
/// when dropped, whichever way the scope is left.
pub(crate) struct StackGuard {
    stack: CallStack,
    depth: usize,
}

impl StackGuard {
    pub(crate) fn enter(stack: &CallStack, label: impl Into<String>) -> Self {
        let depth = stack.depth();
        stack.labels.borrow_mut().push(label.into());
        StackGuard {
            stack: stack.clone(),
            depth,
        }
    }
}

impl Drop for StackGuard {
    fn drop(&mut self) {
        self.stack.labels.borrow_mut().truncate(self.depth);
    }
}
