//! # Wallet Configuration & Constants
//!
//! Every magic number in Aegis lives here. Message targets, storage
//! namespaces, hash domain tags, popup geometry — if a constant shows up
//! hardcoded anywhere else, it escaped and should be walked back.
//!
//! The hash domain tags in particular are load-bearing: changing them after
//! identities have been persisted silently changes every commitment, which
//! is indistinguishable from losing every identity. Choose once.

// ---------------------------------------------------------------------------
// Message Targets
// ---------------------------------------------------------------------------

/// Envelope target for the page-side injected client. Responses from the
/// background carry this target so the client's gateway picks them up.
pub const TARGET_INJECTED: &str = "aegis-injected";

/// Envelope target for the privileged background process. Requests from
/// the page carry this target.
pub const TARGET_BACKGROUND: &str = "aegis-background";

// ---------------------------------------------------------------------------
// Hash Domains
// ---------------------------------------------------------------------------
//
// BLAKE3 everywhere, with a distinct domain prefix per construction so a
// value computed in one context can never collide with another. Same
// discipline as leaf/branch separation in certificate-transparency trees.

/// Domain tag for identity commitments.
pub const COMMITMENT_DOMAIN: &[u8] = b"aegis/commitment/v1";

/// Domain tag for merkle leaf hashing.
pub const MERKLE_LEAF_DOMAIN: &[u8] = b"aegis/merkle-leaf/v1";

/// Domain tag for merkle internal-node hashing.
pub const MERKLE_NODE_DOMAIN: &[u8] = b"aegis/merkle-node/v1";

// ---------------------------------------------------------------------------
// Merkle Tree Limits
// ---------------------------------------------------------------------------

/// Hard ceiling on artifact tree depth. `arity^depth` leaf slots get
/// materialized during a build, so this bounds both memory and CPU for a
/// request the page controls.
pub const MAX_TREE_DEPTH: u32 = 20;

/// Hard ceiling on artifact tree arity. Every level of a build hashes
/// `arity` children per node, so an unbounded branching factor would be
/// the same page-controlled blowup as an unbounded depth.
pub const MAX_TREE_ARITY: u32 = 16;

/// Default depth for group membership trees.
pub const GROUP_TREE_DEPTH: u32 = 10;

/// Default branching factor for group membership trees.
pub const GROUP_TREE_ARITY: u32 = 2;

// ---------------------------------------------------------------------------
// Approval Surface
// ---------------------------------------------------------------------------

/// Approval popup width in pixels.
pub const POPUP_WIDTH: u32 = 357;

/// Approval popup height in pixels.
pub const POPUP_HEIGHT: u32 = 600;

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Maximum retained history entries. Oldest entries are dropped first.
pub const HISTORY_CAPACITY: usize = 100;
