//! Arena-backed prefix tree keyed by string segments.
//!
//! Positions are addressed by `PositionId` (an index into the arena). The
//! root position has an empty key and is never yielded by `nodes()`.

use std::collections::BTreeMap;

/// Index of a position in a [`PrefixTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PositionId(usize);

impl PositionId {
    pub const ROOT: PositionId = PositionId(0);
}

#[derive(Debug, Clone)]
struct Position<V> {
    segment: String,
    parent: Option<PositionId>,
    depth: usize,
    children: BTreeMap<String, PositionId>,
    value: Option<V>,
}

#[derive(Debug, Clone)]
pub struct PrefixTree<V> {
    positions: Vec<Position<V>>,
    values: usize,
}

impl<V> Default for PrefixTree<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> PrefixTree<V> {
    pub fn new() -> Self {
        Self {
            positions: vec![Position {
                segment: String::new(),
                parent: None,
                depth: 0,
                children: BTreeMap::new(),
                value: None,
            }],
            values: 0,
        }
    }

    /// Number of positions holding a value.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values == 0
    }

    /// Store `value` at `key`, creating intermediate positions as needed.
    /// Returns the value previously stored there, if any.
    pub fn insert<I, S>(&mut self, key: I, value: V) -> Option<V>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut current = PositionId::ROOT;
        for segment in key {
            current = self.child_or_insert(current, segment.as_ref());
        }
        self.set_value(current, value)
    }

    fn child_or_insert(&mut self, parent: PositionId, segment: &str) -> PositionId {
        if let Some(&id) = self.positions[parent.0].children.get(segment) {
            return id;
        }
        let id = PositionId(self.positions.len());
        let depth = self.positions[parent.0].depth + 1;
        self.positions.push(Position {
            segment: segment.to_string(),
            parent: Some(parent),
            depth,
            children: BTreeMap::new(),
            value: None,
        });
        self.positions[parent.0]
            .children
            .insert(segment.to_string(), id);
        id
    }

    /// Position at exactly `key`, whether or not it holds a value.
    pub fn find<I, S>(&self, key: I) -> Option<PositionId>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut current = PositionId::ROOT;
        for segment in key {
            current = *self.positions[current.0].children.get(segment.as_ref())?;
        }
        Some(current)
    }

    /// Value stored at exactly `key`.
    pub fn get<I, S>(&self, key: I) -> Option<&V>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.find(key).and_then(|id| self.value(id))
    }

    pub fn value(&self, id: PositionId) -> Option<&V> {
        self.positions.get(id.0)?.value.as_ref()
    }

    /// Set the value at an existing position, returning the previous one.
    pub fn set_value(&mut self, id: PositionId, value: V) -> Option<V> {
        let previous = self.positions[id.0].value.replace(value);
        if previous.is_none() {
            self.values += 1;
        }
        previous
    }

    pub fn children(&self, id: PositionId) -> impl Iterator<Item = PositionId> + '_ {
        self.positions[id.0].children.values().copied()
    }

    /// Key of the position, from the root down.
    #[must_use]
    pub fn path(&self, id: PositionId) -> Vec<&str> {
        let mut path = Vec::with_capacity(self.positions[id.0].depth);
        let mut current = Some(id);
        while let Some(pos) = current {
            let position = &self.positions[pos.0];
            if position.parent.is_some() {
                path.push(position.segment.as_str());
            }
            current = position.parent;
        }
        path.reverse();
        path
    }

    /// Lazy pre-order walk over every non-root position.
    pub fn nodes(&self) -> Nodes<'_, V> {
        let mut stack: Vec<PositionId> = self.children(PositionId::ROOT).collect();
        stack.reverse();
        Nodes { tree: self, stack }
    }

    /// Every non-root position ordered so that children precede parents.
    #[must_use]
    pub fn post_order(&self) -> Vec<PositionId> {
        let mut order = Vec::with_capacity(self.positions.len().saturating_sub(1));
        let mut stack: Vec<(PositionId, bool)> = self
            .children(PositionId::ROOT)
            .map(|id| (id, false))
            .collect();
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
            } else {
                stack.push((id, true));
                stack.extend(self.children(id).map(|child| (child, false)));
            }
        }
        order
    }
}

/// A position yielded by [`PrefixTree::nodes`].
pub struct NodeRef<'a, V> {
    tree: &'a PrefixTree<V>,
    id: PositionId,
}

impl<'a, V> NodeRef<'a, V> {
    #[must_use]
    pub fn path(&self) -> Vec<&'a str> {
        self.tree.path(self.id)
    }

    #[must_use]
    pub fn value(&self) -> Option<&'a V> {
        self.tree.value(self.id)
    }
}

pub struct Nodes<'a, V> {
    tree: &'a PrefixTree<V>,
    stack: Vec<PositionId>,
}

impl<'a, V> Iterator for Nodes<'a, V> {
    type Item = NodeRef<'a, V>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let start = self.stack.len();
        self.stack.extend(self.tree.children(id));
        self.stack[start..].reverse();
        Some(NodeRef {
            tree: self.tree,
            id,
        })
    }
}
