//! Acceleration structure
//! Shared by the OpenCL and CPU backends: the octree is built on the host and
//! walked from its flat serialized form on either side.

pub mod octree;

pub use octree::{traverse, Octree, OctreeNode, OctreeSettings, SerializedOctree};
