//! The row-match plan tree.
//!
//! A [`RowMatchNode`] is the immutable algebraic form of a compiled query
//! over signature rows. Trees are assembled bottom-up through a [`Builder`]
//! that drops null children, folds And/Or chains into right-leaning pairs,
//! eliminates double negation, and fuses negation into row leaves. Nodes
//! borrow their children from the owning arena and never mutate.

use crate::error::{Result, SigilError};
use crate::plan::arena::Arena;
use crate::plan::codec::{ObjectFormatter, ObjectParser, TextObjectFormatter, TextObjectParser};
use crate::row::{AbstractRow, Rank, RowId, MAX_RANK};

/// Arena holding the nodes of one compiled query.
pub type PlanArena<'a> = Arena<RowMatchNode<'a>>;

/// Discriminant of a plan node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    And,
    Or,
    Not,
    Row,
    Report,
}

impl NodeType {
    /// The type tag written ahead of a node of this type.
    pub fn tag(&self) -> &'static str {
        match self {
            NodeType::And => "And",
            NodeType::Or => "Or",
            NodeType::Not => "Not",
            NodeType::Row => "Row",
            NodeType::Report => "Report",
        }
    }
}

/// One node of a compiled row-match plan.
///
/// Trees built through [`Builder`] or parsed from text satisfy the
/// structural invariant that no `Not` node has a `Not` or `Row` child:
/// double negation cancels, and negating a row flips its inversion flag
/// instead.
#[derive(Debug, PartialEq, Eq)]
pub enum RowMatchNode<'a> {
    /// Both subtrees must match.
    And {
        left: &'a RowMatchNode<'a>,
        right: &'a RowMatchNode<'a>,
    },
    /// Either subtree may match.
    Or {
        left: &'a RowMatchNode<'a>,
        right: &'a RowMatchNode<'a>,
    },
    /// The subtree must not match.
    Not { child: &'a RowMatchNode<'a> },
    /// A signature row leaf.
    Row(AbstractRow),
    /// Pass-through marker telling the scanner to report the current row
    /// state; the child may be absent.
    Report { child: Option<&'a RowMatchNode<'a>> },
}

impl<'a> RowMatchNode<'a> {
    /// This node's discriminant.
    pub fn node_type(&self) -> NodeType {
        match self {
            RowMatchNode::And { .. } => NodeType::And,
            RowMatchNode::Or { .. } => NodeType::Or,
            RowMatchNode::Not { .. } => NodeType::Not,
            RowMatchNode::Row(_) => NodeType::Row,
            RowMatchNode::Report { .. } => NodeType::Report,
        }
    }

    /// Write this subtree through the object codec.
    pub fn format(&self, formatter: &mut dyn ObjectFormatter) {
        formatter.write_type_tag(self.node_type().tag());
        match self {
            RowMatchNode::And { left, right } | RowMatchNode::Or { left, right } => {
                formatter.open_object();
                formatter.open_object_field("Children");
                formatter.open_list();
                formatter.open_list_item();
                left.format(formatter);
                formatter.open_list_item();
                right.format(formatter);
                formatter.close_list();
                formatter.close_object();
            }
            RowMatchNode::Not { child } => {
                formatter.open_object();
                formatter.open_object_field("Child");
                child.format(formatter);
                formatter.close_object();
            }
            RowMatchNode::Row(row) => {
                formatter.open_primitive();
                formatter.format_u32(u32::from(row.row_id().rank()));
                formatter.format_u32(row.row_id().index());
                formatter.format_bool(row.is_inverted());
                formatter.close_primitive();
            }
            RowMatchNode::Report { child } => {
                formatter.open_object();
                formatter.open_object_field("Child");
                match child {
                    Some(child) => child.format(formatter),
                    None => formatter.null_object(),
                }
                formatter.close_object();
            }
        }
    }

    /// Parse a non-null subtree from the object codec, allocating nodes in
    /// `arena`.
    pub fn parse(
        parser: &mut dyn ObjectParser,
        arena: &'a PlanArena<'a>,
    ) -> Result<&'a RowMatchNode<'a>> {
        Self::parse_nullable(parser, arena)?
            .ok_or_else(|| SigilError::malformed("unexpected null node"))
    }

    /// Parse a subtree that may be the null object.
    pub fn parse_nullable(
        parser: &mut dyn ObjectParser,
        arena: &'a PlanArena<'a>,
    ) -> Result<Option<&'a RowMatchNode<'a>>> {
        let tag = parser.read_type_tag()?;
        match tag.as_str() {
            "null" => Ok(None),
            "And" => {
                let (left, right) = Self::parse_pair(parser, arena, "And")?;
                Ok(Some(arena.alloc(RowMatchNode::And { left, right })))
            }
            "Or" => {
                let (left, right) = Self::parse_pair(parser, arena, "Or")?;
                Ok(Some(arena.alloc(RowMatchNode::Or { left, right })))
            }
            "Not" => {
                parser.open_object()?;
                parser.open_object_field("Child")?;
                let child = Self::parse(parser, arena)?;
                parser.close_object()?;
                match child.node_type() {
                    NodeType::Not => Err(SigilError::malformed(
                        "a Not node cannot have a Not child",
                    )),
                    NodeType::Row => Err(SigilError::malformed(
                        "a Not node cannot have a Row child",
                    )),
                    _ => Ok(Some(arena.alloc(RowMatchNode::Not { child }))),
                }
            }
            "Row" => {
                parser.open_primitive()?;
                let rank = parser.parse_u32()?;
                if rank > u32::from(MAX_RANK) {
                    return Err(SigilError::malformed(format!(
                        "row rank {rank} exceeds maximum {MAX_RANK}"
                    )));
                }
                let index = parser.parse_u32()?;
                let inverted = parser.parse_bool()?;
                parser.close_primitive()?;
                let row = AbstractRow::new(RowId::new(rank as Rank, index), inverted);
                Ok(Some(arena.alloc(RowMatchNode::Row(row))))
            }
            "Report" => {
                parser.open_object()?;
                parser.open_object_field("Child")?;
                let child = Self::parse_nullable(parser, arena)?;
                parser.close_object()?;
                Ok(Some(arena.alloc(RowMatchNode::Report { child })))
            }
            other => Err(SigilError::malformed(format!(
                "unknown node type tag '{other}'"
            ))),
        }
    }

    fn parse_pair(
        parser: &mut dyn ObjectParser,
        arena: &'a PlanArena<'a>,
        tag: &str,
    ) -> Result<(&'a RowMatchNode<'a>, &'a RowMatchNode<'a>)> {
        parser.open_object()?;
        parser.open_object_field("Children")?;
        parser.open_list()?;
        if !parser.open_list_item()? {
            return Err(SigilError::malformed(format!(
                "{tag} nodes require exactly two children"
            )));
        }
        let left = Self::parse(parser, arena)?;
        if !parser.open_list_item()? {
            return Err(SigilError::malformed(format!(
                "{tag} nodes require exactly two children"
            )));
        }
        let right = Self::parse(parser, arena)?;
        if parser.open_list_item()? {
            return Err(SigilError::malformed(format!(
                "{tag} nodes require exactly two children"
            )));
        }
        parser.close_list()?;
        parser.close_object()?;
        Ok((left, right))
    }

    /// Render this subtree as text.
    pub fn to_text(&self) -> String {
        let mut formatter = TextObjectFormatter::new();
        self.format(&mut formatter);
        formatter.into_string()
    }

    /// Parse a tree from the text rendering. The whole input must be
    /// consumed.
    pub fn from_text(text: &str, arena: &'a PlanArena<'a>) -> Result<&'a RowMatchNode<'a>> {
        let mut parser = TextObjectParser::new(text)?;
        let node = Self::parse(&mut parser, arena)?;
        parser.expect_end()?;
        Ok(node)
    }
}

/// Bottom-up plan assembler.
///
/// Children are folded into an accumulator as they arrive: And/Or chains
/// become right-leaning trees in reverse insertion order, null children are
/// dropped, and negation is simplified on the fly.
pub struct Builder<'a> {
    arena: &'a PlanArena<'a>,
    target: NodeType,
    first_child: Option<&'a RowMatchNode<'a>>,
    node: Option<&'a RowMatchNode<'a>>,
}

impl<'a> Builder<'a> {
    /// Start a fresh builder for an And, Or, or Not node. Any other target
    /// type is a contract violation.
    pub fn new(target: NodeType, arena: &'a PlanArena<'a>) -> Self {
        assert!(
            matches!(target, NodeType::And | NodeType::Or | NodeType::Not),
            "builder target must be And, Or, or Not"
        );
        Builder {
            arena,
            target,
            first_child: None,
            node: None,
        }
    }

    /// Seed a builder from an existing subtree: the builder inherits the
    /// parent's type, and a row parent becomes the accumulator.
    pub fn from_parent(parent: &'a RowMatchNode<'a>, arena: &'a PlanArena<'a>) -> Self {
        let first_child = match parent.node_type() {
            NodeType::Row => Some(parent),
            _ => None,
        };
        Builder {
            arena,
            target: parent.node_type(),
            first_child,
            node: None,
        }
    }

    /// Fold a child into the accumulator. Null children are dropped.
    pub fn add_child(&mut self, child: Option<&'a RowMatchNode<'a>>) {
        match self.target {
            NodeType::And => {
                if self.first_child.is_none() {
                    self.first_child = child;
                } else if let Some(child) = child {
                    let right = self.node.unwrap_or_else(|| self.first_child.unwrap());
                    self.node = Some(self.arena.alloc(RowMatchNode::And { left: child, right }));
                }
            }
            NodeType::Or => {
                if self.first_child.is_none() {
                    self.first_child = child;
                } else if let Some(child) = child {
                    let right = self.node.unwrap_or_else(|| self.first_child.unwrap());
                    self.node = Some(self.arena.alloc(RowMatchNode::Or { left: child, right }));
                }
            }
            NodeType::Not => {
                assert!(self.first_child.is_none(), "a Not accepts a single child");
                if let Some(child) = child {
                    self.first_child = Some(match child {
                        RowMatchNode::Not { child } => *child,
                        RowMatchNode::Row(row) => {
                            self.arena.alloc(RowMatchNode::Row(row.inverted()))
                        }
                        _ => self.arena.alloc(RowMatchNode::Not { child }),
                    });
                }
            }
            other => panic!("builder cannot add children to a {other:?} target"),
        }
    }

    /// Finish and return the built subtree, which is absent when no
    /// non-null child was added.
    pub fn complete(mut self) -> Option<&'a RowMatchNode<'a>> {
        if self.node.is_none() {
            self.node = self.first_child;
        }
        self.node
    }

    /// Allocate a row leaf.
    pub fn create_row_node(row: AbstractRow, arena: &'a PlanArena<'a>) -> &'a RowMatchNode<'a> {
        arena.alloc(RowMatchNode::Row(row))
    }

    /// Allocate a report marker with an optional child.
    pub fn create_report_node(
        child: Option<&'a RowMatchNode<'a>>,
        arena: &'a PlanArena<'a>,
    ) -> &'a RowMatchNode<'a> {
        arena.alloc(RowMatchNode::Report { child })
    }
}
