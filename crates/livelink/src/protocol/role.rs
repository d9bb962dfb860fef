// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Roles: which static and frame shapes belong together.

use parking_lot::RwLock;
use std::sync::Arc;

/// Built-in shape names.
pub mod shapes {
    pub const BASE_STATIC: &str = "BaseStaticData";
    pub const BASE_FRAME: &str = "BaseFrameData";
    pub const ANIMATION_STATIC: &str = "AnimationStaticData";
    pub const ANIMATION_FRAME: &str = "AnimationFrameData";
    pub const TRANSFORM_STATIC: &str = "TransformStaticData";
    pub const TRANSFORM_FRAME: &str = "TransformFrameData";
    pub const CAMERA_STATIC: &str = "CameraStaticData";
    pub const CAMERA_FRAME: &str = "CameraFrameData";
    pub const LIGHT_STATIC: &str = "LightStaticData";
    pub const LIGHT_FRAME: &str = "LightFrameData";
}

/// Expected payload shapes for one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSchema {
    pub name: String,
    pub static_shape: String,
    pub frame_shape: String,
}

impl RoleSchema {
    pub fn new(
        name: impl Into<String>,
        static_shape: impl Into<String>,
        frame_shape: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            static_shape: static_shape.into(),
            frame_shape: frame_shape.into(),
        }
    }
}

/// Ordered, shared set of known roles.
///
/// Shape lookups scan in registration order; the first match wins.
#[derive(Debug, Clone)]
pub struct RoleRegistry {
    roles: Arc<RwLock<Vec<RoleSchema>>>,
}

impl RoleRegistry {
    /// Registry with no roles.
    pub fn empty() -> Self {
        Self {
            roles: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Registry with the built-in Basic, Animation, Transform, Camera and Light roles.
    pub fn with_defaults() -> Self {
        let registry = Self::empty();
        registry.register(RoleSchema::new(
            "Basic",
            shapes::BASE_STATIC,
            shapes::BASE_FRAME,
        ));
        registry.register(RoleSchema::new(
            "Animation",
            shapes::ANIMATION_STATIC,
            shapes::ANIMATION_FRAME,
        ));
        registry.register(RoleSchema::new(
            "Transform",
            shapes::TRANSFORM_STATIC,
            shapes::TRANSFORM_FRAME,
        ));
        registry.register(RoleSchema::new(
            "Camera",
            shapes::CAMERA_STATIC,
            shapes::CAMERA_FRAME,
        ));
        registry.register(RoleSchema::new(
            "Light",
            shapes::LIGHT_STATIC,
            shapes::LIGHT_FRAME,
        ));
        registry
    }

    /// Add a role, replacing any role with the same name in place.
    pub fn register(&self, schema: RoleSchema) {
        let mut roles = self.roles.write();
        if let Some(existing) = roles.iter_mut().find(|r| r.name == schema.name) {
            *existing = schema;
        } else {
            roles.push(schema);
        }
    }

    pub fn get(&self, name: &str) -> Option<RoleSchema> {
        self.roles.read().iter().find(|r| r.name == name).cloned()
    }

    /// First role whose static shape is `shape`.
    pub fn resolve_static(&self, shape: &str) -> Option<RoleSchema> {
        self.roles
            .read()
            .iter()
            .find(|r| r.static_shape == shape)
            .cloned()
    }

    /// First role whose frame shape is `shape`.
    pub fn resolve_frame(&self, shape: &str) -> Option<RoleSchema> {
        self.roles
            .read()
            .iter()
            .find(|r| r.frame_shape == shape)
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.roles.read().iter().map(|r| r.name.clone()).collect()
    }
}

impl Default for RoleRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
