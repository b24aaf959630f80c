use crate::errors::Error;
use crate::node::Node;
use crate::path;
use log::{debug, trace};
use std::sync::{Arc, Weak};

/// A concurrent in-memory directory tree keyed by absolute paths.
///
/// Many threads may create, remove, list and move directories at once;
/// each operation locks only the handful of nodes it touches, and every
/// operation is atomic with respect to the structure of the tree.
pub struct Tree {
    /// Sentinel whose lock stands in for "the root's parent" during
    /// traversal, so the root needs no special casing. It has no
    /// children and never appears in a listing.
    above_root: Arc<Node>,
    root: Arc<Node>,
}

impl Tree {
    /// Creates a tree holding only the root directory `/`.
    pub fn new() -> Tree {
        let above_root = Node::new(Weak::new());
        let root = Node::new(Arc::downgrade(&above_root));
        Tree { above_root, root }
    }

    /// Hand-over-hand read traversal to the node at `path`, which must
    /// be valid.
    ///
    /// Returns the target together with its parent (the sentinel for the
    /// root), with the parent still read-locked. Holding the parent's
    /// lock is what keeps the target linked until the caller converts it
    /// into whatever lock the operation actually needs: at no point
    /// between lookup and conversion can another thread unlink the
    /// target.
    fn find_readlocked_parent(&self, path: &str) -> Result<(Arc<Node>, Arc<Node>), Error> {
        let mut parent = Arc::clone(&self.above_root);
        parent.lock.read();
        let mut node = Arc::clone(&self.root);
        for name in path::components(path) {
            node.lock.read();
            parent.lock.read_unlock();
            parent = node;
            // The read lock on `parent` pins the child in its map while
            // we take our own reference to it.
            node = match unsafe { parent.child(name) } {
                Some(child) => child,
                None => {
                    parent.lock.read_unlock();
                    return Err(Error::NotFound);
                }
            };
        }
        Ok((node, parent))
    }

    /// Creates an empty directory at `path`.
    pub fn create(&self, path: &str) -> Result<(), Error> {
        trace!("create {:?}", path);
        if !path::is_valid(path) {
            return Err(Error::InvalidArgument);
        }
        if path == "/" {
            return Err(Error::AlreadyExists);
        }
        let (parent_path, name) = path::split_parent(path);
        let (parent, grandparent) = self.find_readlocked_parent(parent_path)?;
        // Take the write lock while the grandparent still pins `parent`.
        parent.lock.write();
        grandparent.lock.read_unlock();
        let result = unsafe {
            if parent.child(name).is_some() {
                Err(Error::AlreadyExists)
            } else {
                parent.insert_child(name, Node::new(Arc::downgrade(&parent)));
                Ok(())
            }
        };
        parent.lock.write_unlock();
        if result.is_ok() {
            debug!("created {:?}", path);
        }
        result
    }

    /// Returns the names of the children of the directory at `path`,
    /// sorted and comma-separated.
    ///
    /// The listing is a snapshot: it was the exact content of the
    /// directory at some instant during the call.
    pub fn list(&self, path: &str) -> Result<String, Error> {
        trace!("list {:?}", path);
        if !path::is_valid(path) {
            return Err(Error::InvalidArgument);
        }
        let (node, parent) = self.find_readlocked_parent(path)?;
        node.lock.read();
        parent.lock.read_unlock();
        let listing = unsafe { node.list_children() };
        node.lock.read_unlock();
        Ok(listing)
    }

    /// Removes the empty directory at `path`.
    pub fn remove(&self, path: &str) -> Result<(), Error> {
        trace!("remove {:?}", path);
        if !path::is_valid(path) {
            return Err(Error::InvalidArgument);
        }
        if path == "/" {
            return Err(Error::Busy);
        }
        let (parent_path, name) = path::split_parent(path);
        let (parent, grandparent) = self.find_readlocked_parent(parent_path)?;
        parent.lock.write();
        grandparent.lock.read_unlock();
        let child = match unsafe { parent.child(name) } {
            Some(child) => child,
            None => {
                parent.lock.write_unlock();
                return Err(Error::NotFound);
            }
        };
        child.lock.write();
        if unsafe { child.has_children() } {
            child.lock.write_unlock();
            parent.lock.write_unlock();
            return Err(Error::NotEmpty);
        }
        debug_assert!(unsafe { child.parent() }.ptr_eq(&Arc::downgrade(&parent)));
        unsafe { parent.remove_child(name) };
        parent.lock.write_unlock();
        child.lock.write_unlock();
        // `child` was unlinked under both write locks; dropping the last
        // reference frees it, after any thread still waiting on its lock
        // has bounced off.
        drop(child);
        debug!("removed {:?}", path);
        Ok(())
    }

    /// Moves the directory at `source`, with everything under it, to
    /// `target`.
    ///
    /// No concurrent reader can observe the moved subtree in both places
    /// or in neither: the subtree is write-locked in its entirety while
    /// it migrates.
    pub fn rename(&self, source: &str, target: &str) -> Result<(), Error> {
        trace!("rename {:?} -> {:?}", source, target);
        if !path::is_valid(source) || !path::is_valid(target) {
            return Err(Error::InvalidArgument);
        }
        if source == "/" {
            return Err(Error::Busy);
        }
        if target == "/" {
            return Err(Error::AlreadyExists);
        }
        if path::is_strict_subpath(target, source) {
            return Err(Error::InvalidMove);
        }

        let (source_parent_path, source_name) = path::split_parent(source);
        let (target_parent_path, target_name) = path::split_parent(target);
        let lca_path = path::common_prefix(source_parent_path, target_parent_path);

        // The write-locked LCA is the serialization point: once held, no
        // concurrent operation can enter the region below it, and every
        // further acquisition is strictly top-down, so two overlapping
        // moves can never wait on each other in a cycle.
        let (lca, lca_parent) = self.find_readlocked_parent(lca_path)?;
        lca.lock.write();
        lca_parent.lock.read_unlock();

        if source == target {
            // Textually identical paths: nothing moves, but the source
            // must exist. Both parents are the LCA itself here.
            let found = unsafe { lca.child(source_name).is_some() };
            lca.lock.write_unlock();
            return if found { Ok(()) } else { Err(Error::NotFound) };
        }

        let source_parent =
            match descend_wrlocked(&lca, path::strip_prefix(source_parent_path, lca_path)) {
                Ok(node) => node,
                Err(err) => {
                    lca.lock.write_unlock();
                    return Err(err);
                }
            };
        let target_parent =
            match descend_wrlocked(&lca, path::strip_prefix(target_parent_path, lca_path)) {
                Ok(node) => node,
                Err(err) => {
                    if !Arc::ptr_eq(&source_parent, &lca) {
                        source_parent.lock.write_unlock();
                    }
                    lca.lock.write_unlock();
                    return Err(err);
                }
            };

        let result = match unsafe { source_parent.child(source_name) } {
            None => Err(Error::NotFound),
            Some(_) if unsafe { target_parent.child(target_name).is_some() } => {
                Err(Error::AlreadyExists)
            }
            Some(moved) => {
                debug_assert!(unsafe { moved.parent() }.ptr_eq(&Arc::downgrade(&source_parent)));
                // Freeze the moving subtree so no operation is mid-flight
                // inside it at the instant it changes parents.
                let locked = moved.lock_subtree_write();
                unsafe {
                    source_parent.remove_child(source_name);
                    target_parent.insert_child(target_name, Arc::clone(&moved));
                    moved.set_parent(Arc::downgrade(&target_parent));
                }
                Node::unlock_subtree_write(locked);
                Ok(())
            }
        };

        if !Arc::ptr_eq(&target_parent, &lca) {
            target_parent.lock.write_unlock();
        }
        if !Arc::ptr_eq(&source_parent, &lca) {
            source_parent.lock.write_unlock();
        }
        lca.lock.write_unlock();
        if result.is_ok() {
            debug!("renamed {:?} -> {:?}", source, target);
        }
        result
    }
}

/// Write-mode hand-over-hand descent from a node whose write lock the
/// caller already holds, following `remainder` (a relative path).
///
/// The lock on `from` is always retained, even on failure; intermediate
/// locks are handed over step by step. On success the returned node is
/// write-locked (it is `from` itself when `remainder` is empty, with no
/// extra lock taken).
fn descend_wrlocked(from: &Arc<Node>, remainder: &str) -> Result<Arc<Node>, Error> {
    let mut node = Arc::clone(from);
    for name in path::components(remainder) {
        let child = match unsafe { node.child(name) } {
            Some(child) => child,
            None => {
                if !Arc::ptr_eq(&node, from) {
                    node.lock.write_unlock();
                }
                return Err(Error::NotFound);
            }
        };
        child.lock.write();
        if !Arc::ptr_eq(&node, from) {
            node.lock.write_unlock();
        }
        node = child;
    }
    Ok(node)
}

impl Default for Tree {
    fn default() -> Tree {
        Tree::new()
    }
}

impl Drop for Tree {
    fn drop(&mut self) {
        // Tear the tree down iteratively; the default recursive `Arc`
        // drop would use one stack frame per level of depth.
        let mut stack = vec![Arc::clone(&self.root)];
        while let Some(node) = stack.pop() {
            // Nothing else can touch the tree once its owner drops it.
            for child in unsafe { node.take_children() }.into_values() {
                stack.push(child);
            }
        }
    }
}
