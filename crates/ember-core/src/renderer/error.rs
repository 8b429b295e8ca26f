// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Defines the hierarchy of error types for the rendering subsystem.
//!
//! Only resource creation and renderer initialization report errors through
//! these types. Per-draw failures (a missing shader permutation, a material that
//! cannot bind) are not errors: the draw is skipped and the frame continues.

use crate::renderer::api::TextureFormat;
use std::fmt;

/// An error related to the creation or use of a GPU resource.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceError {
    /// A resource could not be found.
    NotFound,
    /// The handle used to reference a resource is invalid or was destroyed.
    InvalidHandle,
    /// The device ran out of memory while creating the resource.
    OutOfMemory,
    /// The requested format cannot be used the way the descriptor asks.
    UnsupportedFormat(TextureFormat),
    /// The backend does not support the requested capability.
    Unsupported(String),
    /// An error originating from the specific graphics backend implementation.
    BackendError(String),
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::NotFound => write!(f, "Resource not found."),
            ResourceError::InvalidHandle => write!(f, "Invalid resource handle or ID."),
            ResourceError::OutOfMemory => write!(f, "Out of GPU memory."),
            ResourceError::UnsupportedFormat(format) => {
                write!(f, "Unsupported texture format for this usage: {format:?}")
            }
            ResourceError::Unsupported(msg) => write!(f, "Unsupported capability: {msg}"),
            ResourceError::BackendError(msg) => {
                write!(f, "Backend-specific resource error: {msg}")
            }
        }
    }
}

impl std::error::Error for ResourceError {}

/// A high-level error raised by renderer construction or the render thread.
#[derive(Debug)]
pub enum RenderError {
    /// An operation was attempted before the renderer was initialized.
    NotInitialized,
    /// A shader program or core buffer could not be created during initialization.
    InitializationFailed(String),
    /// An error occurred while managing a GPU resource.
    ResourceError(ResourceError),
    /// The render thread is gone or refused the command.
    ThreadDisconnected,
    /// An unexpected or internal error occurred.
    Internal(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::NotInitialized => write!(f, "The renderer is not initialized."),
            RenderError::InitializationFailed(msg) => {
                write!(f, "Failed to initialize renderer: {msg}")
            }
            RenderError::ResourceError(err) => {
                write!(f, "Graphics resource operation failed: {err}")
            }
            RenderError::ThreadDisconnected => write!(f, "The render thread is disconnected."),
            RenderError::Internal(msg) => {
                write!(f, "An internal or unexpected error occurred: {msg}")
            }
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::ResourceError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceError> for RenderError {
    fn from(err: ResourceError) -> Self {
        RenderError::ResourceError(err)
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn resource_error_display() {
        assert_eq!(
            format!("{}", ResourceError::UnsupportedFormat(TextureFormat::Rgba8Unorm)),
            "Unsupported texture format for this usage: Rgba8Unorm"
        );
        assert_eq!(
            format!("{}", ResourceError::BackendError("lost".to_string())),
            "Backend-specific resource error: lost"
        );
    }

    #[test]
    fn render_error_wraps_resource_error() {
        let render_err: RenderError = ResourceError::OutOfMemory.into();
        assert_eq!(
            format!("{render_err}"),
            "Graphics resource operation failed: Out of GPU memory."
        );
        assert!(render_err.source().is_some());
    }

    #[test]
    fn initialization_error_has_no_source() {
        let err = RenderError::InitializationFailed("missing depth program".into());
        assert!(err.source().is_none());
        assert_eq!(
            format!("{err}"),
            "Failed to initialize renderer: missing depth program"
        );
    }
}
