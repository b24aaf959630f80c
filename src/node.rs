use crate::map::Map;
use crate::path;
use crate::rwlock::RwLock;
use std::cell::UnsafeCell;
use std::sync::{Arc, Weak};

/// A single directory of the tree.
///
/// Children own their subtrees through `Arc`s; the parent link is a
/// `Weak` back reference, so destroying a directory destroys everything
/// below it and nothing above it. A node's lock lives exactly as long as
/// the node, and any thread blocked on the lock necessarily holds an
/// `Arc` to the node, so an unlinked node cannot be freed out from under
/// a waiter.
pub(crate) struct Node {
    /// Guards `inner`. Also taken across whole subtrees when a move
    /// freezes the directory it is migrating.
    pub(crate) lock: RwLock,
    inner: UnsafeCell<NodeInner>,
}

struct NodeInner {
    /// The children of this directory, keyed by name.
    children: Map<Arc<Node>>,
    /// The containing directory; the tree's sentinel above the root is
    /// the only node whose parent is dangling.
    parent: Weak<Node>,
}

// `inner` is only touched while `lock` is held in the required mode.
unsafe impl Send for Node {}
unsafe impl Sync for Node {}

impl Node {
    pub(crate) fn new(parent: Weak<Node>) -> Arc<Node> {
        Arc::new(Node {
            lock: RwLock::new(),
            inner: UnsafeCell::new(NodeInner {
                children: Map::default(),
                parent,
            }),
        })
    }

    /// # Safety
    ///
    /// The caller must hold `self.lock` in read or write mode.
    unsafe fn inner(&self) -> &NodeInner {
        &*self.inner.get()
    }

    /// # Safety
    ///
    /// The caller must hold `self.lock` in write mode.
    #[allow(clippy::mut_from_ref)]
    unsafe fn inner_mut(&self) -> &mut NodeInner {
        &mut *self.inner.get()
    }

    /// Looks up a child by name.
    ///
    /// # Safety
    ///
    /// The caller must hold `self.lock` in read or write mode.
    pub(crate) unsafe fn child(&self, name: &str) -> Option<Arc<Node>> {
        self.inner().children.get(name).map(Arc::clone)
    }

    /// # Safety
    ///
    /// The caller must hold `self.lock` in read or write mode.
    pub(crate) unsafe fn has_children(&self) -> bool {
        !self.inner().children.is_empty()
    }

    /// Serializes the names of this directory's children in canonical
    /// listing order.
    ///
    /// # Safety
    ///
    /// The caller must hold `self.lock` in read or write mode.
    pub(crate) unsafe fn list_children(&self) -> String {
        path::join_names(self.inner().children.keys())
    }

    /// # Safety
    ///
    /// The caller must hold `self.lock` in read or write mode.
    pub(crate) unsafe fn parent(&self) -> Weak<Node> {
        Weak::clone(&self.inner().parent)
    }

    /// Adds a child. No child with this name may exist yet.
    ///
    /// # Safety
    ///
    /// The caller must hold `self.lock` in write mode.
    pub(crate) unsafe fn insert_child(&self, name: &str, child: Arc<Node>) {
        self.inner_mut().children.insert(name.to_owned(), child);
    }

    /// Detaches a child and returns it. The child's lock is untouched;
    /// the caller decides when the child may go away.
    ///
    /// # Safety
    ///
    /// The caller must hold `self.lock` in write mode.
    pub(crate) unsafe fn remove_child(&self, name: &str) -> Option<Arc<Node>> {
        self.inner_mut().children.remove(name)
    }

    /// # Safety
    ///
    /// The caller must hold `self.lock` in write mode.
    pub(crate) unsafe fn set_parent(&self, parent: Weak<Node>) {
        self.inner_mut().parent = parent;
    }

    /// Write-locks this node and every descendant, in pre-order, and
    /// returns the locked nodes in acquisition order. Pre-order matches
    /// the direction of every other acquisition in the system, so this
    /// cannot cross another traversal. Iterative: the tree may be deeper
    /// than the call stack.
    pub(crate) fn lock_subtree_write(self: &Arc<Self>) -> Vec<Arc<Node>> {
        let mut locked = Vec::new();
        let mut stack = vec![Arc::clone(self)];
        while let Some(node) = stack.pop() {
            node.lock.write();
            // The children cannot change once the node is write-locked.
            for child in unsafe { node.inner() }.children.values() {
                stack.push(Arc::clone(child));
            }
            locked.push(node);
        }
        locked
    }

    /// Releases the locks taken by [`Node::lock_subtree_write`].
    pub(crate) fn unlock_subtree_write(locked: Vec<Arc<Node>>) {
        for node in locked {
            node.lock.write_unlock();
        }
    }

    /// Empties this node's children map for iterative teardown.
    ///
    /// # Safety
    ///
    /// The caller must have exclusive access to the tree; no concurrent
    /// operation may be running.
    pub(crate) unsafe fn take_children(&self) -> Map<Arc<Node>> {
        std::mem::take(&mut self.inner_mut().children)
    }
}
