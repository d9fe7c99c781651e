//! Resource handles.

use std::fmt;

/// Index plus generation identifying one object inside a `ResourceContainer`.
///
/// Handles are plain values. Copying one never affects the object it names,
/// and a handle whose object has been removed simply stops resolving.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    index: u32,
    generation: u32,
}

impl ResourceHandle {
    /// The null handle. Never returned by a container.
    pub const NULL: Self = Self {
        index: u32::MAX,
        generation: u32::MAX,
    };

    /// Create a handle from its raw parts.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index inside the owning container.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation the slot had when this handle was issued.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Returns `true` for the null handle.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.index == u32::MAX
    }

    /// Returns `true` unless this is the null handle.
    ///
    /// A valid-looking handle may still be stale; only the container can tell.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        !self.is_null()
    }
}

impl Default for ResourceHandle {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "ResourceHandle(null)")
        } else {
            write!(f, "ResourceHandle({}v{})", self.index, self.generation)
        }
    }
}

/// Conversion between a typed handle and the raw handle a container stores.
pub trait Handle: Copy + Eq {
    /// Wrap a raw handle.
    fn from_raw(raw: ResourceHandle) -> Self;

    /// Unwrap to the raw handle.
    fn raw(self) -> ResourceHandle;
}

impl Handle for ResourceHandle {
    #[inline]
    fn from_raw(raw: ResourceHandle) -> Self {
        raw
    }

    #[inline]
    fn raw(self) -> ResourceHandle {
        self
    }
}

macro_rules! typed_handles {
    ($($(#[$meta:meta])* $name:ident;)*) => {
        $(
            $(#[$meta])*
            #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
            #[repr(transparent)]
            pub struct $name(ResourceHandle);

            impl $name {
                /// The null handle.
                pub const NULL: Self = Self(ResourceHandle::NULL);

                /// Returns `true` unless this is the null handle.
                #[inline]
                #[must_use]
                pub const fn is_valid(self) -> bool {
                    self.0.is_valid()
                }

                /// Returns `true` for the null handle.
                #[inline]
                #[must_use]
                pub const fn is_null(self) -> bool {
                    self.0.is_null()
                }
            }

            impl Handle for $name {
                #[inline]
                fn from_raw(raw: ResourceHandle) -> Self {
                    Self(raw)
                }

                #[inline]
                fn raw(self) -> ResourceHandle {
                    self.0
                }
            }

            impl From<$name> for ResourceHandle {
                fn from(handle: $name) -> Self {
                    handle.0
                }
            }

            impl fmt::Debug for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    if self.0.is_null() {
                        write!(f, "{}(null)", stringify!($name))
                    } else {
                        write!(f, "{}({}v{})", stringify!($name), self.0.index(), self.0.generation())
                    }
                }
            }
        )*
    };
}

typed_handles! {
    /// Handle to a GPU image.
    ImageHandle;
    /// Handle to a GPU buffer.
    BufferHandle;
    /// Handle to a compiled shader module.
    ShaderModuleHandle;
    /// Handle to a sampler.
    SamplerHandle;
    /// Handle to an image + sampler pair.
    TextureHandle;
    /// Handle to a material.
    MaterialHandle;
    /// Handle to a mesh.
    MeshHandle;
}
