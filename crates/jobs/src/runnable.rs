//! Type-erased job payload stored inline in a job slot.
//!
//! A [`Runnable`] holds any `FnOnce() + Send + 'static` closure. Closures that fit in
//! [`INLINE_CAPACITY`] bytes are stored in place with a pair of monomorphized
//! function pointers standing in for a vtable, so submitting them allocates nothing.
//! Larger closures are boxed and the box pointer is stored inline instead.

use std::mem::{self, ManuallyDrop, MaybeUninit};
use std::ptr;

/// Bytes of closure state stored without allocation.
pub const INLINE_CAPACITY: usize = 64;

const INLINE_ALIGN: usize = 16;

#[repr(C, align(16))]
struct Storage([MaybeUninit<u8>; INLINE_CAPACITY]);

/// An owned, type-erased, run-once job body.
pub struct Runnable {
    storage: Storage,
    call: unsafe fn(*mut u8),
    drop: unsafe fn(*mut u8),
    inline: bool,
}

// Safety: `Runnable::new` only accepts `Send` closures, and the storage is
// accessed exclusively through the owning `Runnable`.
unsafe impl Send for Runnable {}

impl Runnable {
    /// Wrap a closure, storing it inline when it fits.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        if fits_inline::<F>() {
            // Safety: size and alignment checked above.
            unsafe { Self::store(f, true) }
        } else {
            let boxed = Box::new(f);
            let thunk = move || boxed();
            debug_assert!(fits_inline_val(&thunk));
            // Safety: a closure capturing only a `Box` is pointer sized.
            unsafe { Self::store(thunk, false) }
        }
    }

    /// Whether the closure state lives in the slot rather than on the heap.
    pub fn is_inline(&self) -> bool {
        self.inline
    }

    /// Run the closure, consuming the payload.
    pub fn run(self) {
        let mut this = ManuallyDrop::new(self);
        // Safety: `call` reads the closure out exactly once; `ManuallyDrop`
        // keeps `Drop` from touching the moved-out storage afterwards.
        unsafe { (this.call)(this.storage.0.as_mut_ptr().cast()) }
    }

    unsafe fn store<F>(f: F, inline: bool) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let mut storage = Storage([MaybeUninit::uninit(); INLINE_CAPACITY]);
        ptr::write(storage.0.as_mut_ptr().cast::<F>(), f);
        Self {
            storage,
            call: call_erased::<F>,
            drop: drop_erased::<F>,
            inline,
        }
    }
}

impl Drop for Runnable {
    fn drop(&mut self) {
        // Safety: the storage still holds an initialized `F`; `run` never reaches here.
        unsafe { (self.drop)(self.storage.0.as_mut_ptr().cast()) }
    }
}

impl std::fmt::Debug for Runnable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runnable").field("inline", &self.inline).finish()
    }
}

fn fits_inline<F>() -> bool {
    mem::size_of::<F>() <= INLINE_CAPACITY && mem::align_of::<F>() <= INLINE_ALIGN
}

fn fits_inline_val<F>(_: &F) -> bool {
    fits_inline::<F>()
}

unsafe fn call_erased<F: FnOnce()>(data: *mut u8) {
    let f = ptr::read(data.cast::<F>());
    f();
}

unsafe fn drop_erased<F>(data: *mut u8) {
    ptr::drop_in_place(data.cast::<F>());
}
