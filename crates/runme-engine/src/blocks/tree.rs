use super::{Block, CodeBlock};

/// Index of a block in its [`BlockTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
struct Slot {
    block: Option<Block>,
    parent: Option<BlockId>,
    children: Vec<BlockId>,
}

/// Ordered tree of blocks under an item-less root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTree {
    slots: Vec<Slot>,
}

impl Default for BlockTree {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockTree {
    pub fn new() -> Self {
        Self {
            slots: vec![Slot {
                block: None,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> BlockId {
        BlockId(0)
    }

    /// Block stored at `id`; `None` for the root.
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.slots.get(id.0).and_then(|slot| slot.block.as_ref())
    }

    pub fn children(&self, id: BlockId) -> &[BlockId] {
        self.slots
            .get(id.0)
            .map(|slot| slot.children.as_slice())
            .unwrap_or_default()
    }

    pub fn parent(&self, id: BlockId) -> Option<BlockId> {
        self.slots.get(id.0).and_then(|slot| slot.parent)
    }

    /// Position of `id` among its siblings.
    pub fn index(&self, id: BlockId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|c| *c == id)
    }

    pub fn append(&mut self, parent: BlockId, block: Block) -> BlockId {
        let index = self.children(parent).len();
        self.insert_at(parent, index, block)
    }

    /// Insert `block` as the `index`-th child of `parent`, shifting later
    /// siblings right. Indexes past the end append.
    pub fn insert_at(&mut self, parent: BlockId, index: usize, block: Block) -> BlockId {
        let id = BlockId(self.slots.len());
        self.slots.push(Slot {
            block: Some(block),
            parent: Some(parent),
            children: Vec::new(),
        });
        let siblings = &mut self.slots[parent.0].children;
        siblings.insert(index.min(siblings.len()), id);
        id
    }

    /// Number of blocks, root excluded.
    pub fn len(&self) -> usize {
        self.slots.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pre-order walk below `id`, `id` itself excluded.
    pub fn descendants(&self, id: BlockId) -> Vec<BlockId> {
        let mut out = Vec::new();
        let mut stack: Vec<BlockId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev());
        }
        out
    }

    /// True if `id` is, or contains, a code block.
    pub fn contains_code(&self, id: BlockId) -> bool {
        self.block(id).is_some_and(|b| b.as_code().is_some())
            || self
                .descendants(id)
                .into_iter()
                .any(|d| self.block(d).is_some_and(|b| b.as_code().is_some()))
    }

    /// Every code block in document order.
    pub fn code_blocks(&self) -> Vec<&CodeBlock> {
        self.descendants(self.root())
            .into_iter()
            .filter_map(|id| self.block(id).and_then(Block::as_code))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeId;
    use crate::blocks::{InnerBlock, InnerKind, MarkdownBlock};

    fn markdown(n: usize) -> Block {
        Block::Markdown(MarkdownBlock {
            node: NodeId(n),
            value: format!("para {n}"),
        })
    }

    #[test]
    fn test_append_and_navigate() {
        let mut tree = BlockTree::new();
        let root = tree.root();
        let list = tree.append(
            root,
            Block::Inner(InnerBlock {
                node: NodeId(1),
                kind: InnerKind::List,
                value: "- a".into(),
            }),
        );
        let first = tree.append(list, markdown(2));
        let second = tree.append(root, markdown(3));

        assert_eq!(tree.len(), 3);
        assert_eq!(tree.parent(first), Some(list));
        assert_eq!(tree.index(second), Some(1));
        assert_eq!(tree.descendants(root), vec![list, first, second]);
        assert!(tree.block(root).is_none());
        assert!(!tree.contains_code(list));
    }

    #[test]
    fn test_insert_at_keeps_sibling_order() {
        let mut tree = BlockTree::new();
        let root = tree.root();
        let first = tree.append(root, markdown(1));
        let last = tree.append(root, markdown(3));

        let middle = tree.insert_at(root, 1, markdown(2));
        let front = tree.insert_at(root, 0, markdown(0));
        let end = tree.insert_at(root, 99, markdown(4));

        assert_eq!(tree.children(root), &[front, first, middle, last, end]);
        assert_eq!(tree.index(middle), Some(2));
        assert_eq!(tree.parent(middle), Some(root));
        assert_eq!(tree.descendants(root), vec![front, first, middle, last, end]);
    }
}
