//! Backend-agnostic description of a read.

use crate::query::filter::Filter;

pub const SOFT_DELETE_COLUMN: &str = "deleted_at";

/// How a related table hangs off its parent. Primary keys are always `id`.
#[derive(Debug, Clone, PartialEq)]
pub enum Link {
    /// `related.id = parent.<local_key>`, projected as an object (or null).
    BelongsTo { local_key: String },
    /// `related.<foreign_key> = parent.id`, projected as an array.
    HasMany { foreign_key: String },
}

/// A nested relation in the projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub alias: String,
    pub table: String,
    pub link: Link,
    /// Empty selects every column.
    pub columns: Vec<String>,
    pub relations: Vec<Relation>,
    /// Restrict the related rows.
    pub filters: Vec<Filter>,
    /// Drop the parent row when no related row survives `filters`.
    pub inner: bool,
    /// `false` turns the relation into a pure existence filter.
    pub embed: bool,
}

impl Relation {
    pub fn belongs_to(alias: &str, table: &str, local_key: &str) -> Self {
        Self::new(
            alias,
            table,
            Link::BelongsTo {
                local_key: local_key.to_string(),
            },
        )
    }

    pub fn has_many(alias: &str, table: &str, foreign_key: &str) -> Self {
        Self::new(
            alias,
            table,
            Link::HasMany {
                foreign_key: foreign_key.to_string(),
            },
        )
    }

    fn new(alias: &str, table: &str, link: Link) -> Self {
        Self {
            alias: alias.to_string(),
            table: table.to_string(),
            link,
            columns: Vec::new(),
            relations: Vec::new(),
            filters: Vec::new(),
            inner: false,
            embed: true,
        }
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Excludes soft-deleted related rows.
    pub fn live(self) -> Self {
        self.filter(Filter::is_null(SOFT_DELETE_COLUMN))
    }

    pub fn inner(mut self) -> Self {
        self.inner = true;
        self
    }

    /// Inner and not projected.
    pub fn exists(mut self) -> Self {
        self.inner = true;
        self.embed = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

/// Page window. A descriptor carries exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Window {
    #[default]
    All,
    Limit(u64),
    /// Inclusive on both ends.
    Range { from: u64, to: u64 },
}

impl Window {
    pub fn offset(&self) -> u64 {
        match self {
            Window::Range { from, .. } => *from,
            _ => 0,
        }
    }

    /// Maximum number of rows, `None` for unbounded.
    pub fn size(&self) -> Option<u64> {
        match self {
            Window::All => None,
            Window::Limit(n) => Some(*n),
            Window::Range { from, to } if to < from => Some(0),
            Window::Range { from, to } => Some(to - from + 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    pub table: String,
    /// Empty selects every column.
    pub columns: Vec<String>,
    pub relations: Vec<Relation>,
    pub filters: Vec<Filter>,
    pub exclude_filters: Vec<Filter>,
    /// OR-ed group, AND-ed with everything else when non-empty.
    pub or_filters: Vec<Filter>,
    pub order_by: Vec<OrderBy>,
    pub window: Window,
    pub want_count: bool,
    pub head_only: bool,
}

impl QueryDescriptor {
    pub fn from(table: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: Vec::new(),
            relations: Vec::new(),
            filters: Vec::new(),
            exclude_filters: Vec::new(),
            or_filters: Vec::new(),
            order_by: Vec::new(),
            window: Window::All,
            want_count: false,
            head_only: false,
        }
    }

    /// Same as `from`, with soft-deleted rows already excluded.
    pub fn live(table: &str) -> Self {
        Self::from(table).filter(Filter::is_null(SOFT_DELETE_COLUMN))
    }

    pub fn select(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Drops rows the filter matches. Rows where the column is NULL are kept.
    pub fn exclude(mut self, filter: Filter) -> Self {
        self.exclude_filters.push(filter);
        self
    }

    pub fn any_of(mut self, filters: Vec<Filter>) -> Self {
        self.or_filters = filters;
        self
    }

    pub fn order_by(mut self, column: &str, descending: bool) -> Self {
        self.order_by.push(OrderBy {
            column: column.to_string(),
            descending,
        });
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.window = Window::Limit(n);
        self
    }

    pub fn range(mut self, from: u64, to: u64) -> Self {
        self.window = Window::Range { from, to };
        self
    }

    pub fn count(mut self) -> Self {
        self.want_count = true;
        self
    }

    pub fn head(mut self) -> Self {
        self.want_count = true;
        self.head_only = true;
        self
    }

    /// Every filter in the descriptor, nested relations included.
    pub fn all_filters(&self) -> Vec<&Filter> {
        fn walk<'a>(relations: &'a [Relation], out: &mut Vec<&'a Filter>) {
            for r in relations {
                out.extend(r.filters.iter());
                walk(&r.relations, out);
            }
        }
        let mut out: Vec<&Filter> = self
            .filters
            .iter()
            .chain(&self.exclude_filters)
            .chain(&self.or_filters)
            .collect();
        walk(&self.relations, &mut out);
        out
    }
}
