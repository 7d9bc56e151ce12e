//! `SelectPlus`: a root query plus declared fetch paths.

use super::filter::{ColumnRef, Filter};
use super::statement::Statement;
use crate::config::PrefetchConfig;
use crate::error::ConfigurationError;
use crate::executor::{LifeError, LifeExecutor};
use crate::prefetch::{self, assembler, Fetched, FetchedOne, JoinPlan, NodeId, PathStep};
use crate::schema::{EntityId, RelationId, Schema};
use sea_query::Order;

/// Query over one root entity that eager loads declared relation paths.
///
/// `plus` calls merge into one join plan; declaring the same path twice is a
/// no-op. Declaration errors do not break the chain: the first one is kept and
/// returned by the terminal call before any statement is issued.
///
/// # Example
///
/// ```
/// use lifeguard_prefetch::{root, MockStore, CountingExecutor, Schema, SelectPlus};
/// use sea_query::Value;
///
/// let mut builder = Schema::builder();
/// let user = builder.entity("User", "users", "id", &["id", "username"])?;
/// let blog = builder.entity("Blog", "blog", "pk", &["pk", "user_id", "title"])?;
/// let blog_user = builder.belongs_to(blog, "user", user, "user_id", Some("blog_set"))?;
/// let schema = builder.build();
///
/// let mut store = MockStore::new(&schema);
/// store.insert("users", vec![Value::Int(Some(1)), "alice".into()])?;
/// store.insert("blog", vec![Value::Int(Some(1)), Value::Int(Some(1)), "hello".into()])?;
/// let executor = CountingExecutor::new(store);
///
/// let fetched = SelectPlus::new(&schema, blog)
///     .plus([blog_user])
///     .filter(root("title").eq("hello"))
///     .get(&executor)?;
///
/// let post = fetched.instance();
/// assert_eq!(post.one(blog_user)?.unwrap().text("username"), Some("alice"));
/// assert_eq!(executor.sql_count(), 1);
/// # Ok::<(), lifeguard_prefetch::LifeError>(())
/// ```
#[derive(Debug, Clone)]
pub struct SelectPlus<'s> {
    schema: &'s Schema,
    plan: JoinPlan,
    filter: Option<Filter>,
    order_by: Vec<(ColumnRef, Order)>,
    limit: Option<u64>,
    config: PrefetchConfig,
    error: Option<ConfigurationError>,
}

impl<'s> SelectPlus<'s> {
    pub fn new(schema: &'s Schema, root: EntityId) -> Self {
        Self {
            schema,
            plan: JoinPlan::new(schema, root),
            filter: None,
            order_by: Vec::new(),
            limit: None,
            config: PrefetchConfig::default(),
            error: None,
        }
    }

    /// Declare a fetch path of relations, e.g. `[Blog.user]` or
    /// `[User.blog_set, Blog.comments]`.
    pub fn plus<I>(self, path: I) -> Self
    where
        I: IntoIterator<Item = RelationId>,
    {
        self.plus_as(path.into_iter().map(PathStep::new))
    }

    /// Declare a fetch path whose steps may carry explicit aliases.
    pub fn plus_as<I>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = PathStep>,
    {
        let steps: Vec<PathStep> = path.into_iter().collect();
        if let Err(e) = self.try_plus(&steps) {
            log::debug!("fetch path rejected: {e}");
            if self.error.is_none() {
                self.error = Some(e);
            }
        }
        self
    }

    /// Declare a fetch path and report a rejected declaration immediately.
    pub fn try_plus(&mut self, path: &[PathStep]) -> Result<NodeId, ConfigurationError> {
        self.plan.declare(self.schema, path)
    }

    /// Restrict the root rows. Repeated calls are combined with `AND`.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    pub fn order_by(mut self, column: ColumnRef, order: Order) -> Self {
        self.order_by.push((column, order));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_config(mut self, config: PrefetchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn plan(&self) -> &JoinPlan {
        &self.plan
    }

    /// The root statement, with every filter and order reference resolved.
    ///
    /// # Errors
    ///
    /// The first rejected path declaration, or an ambiguous or unknown
    /// reference in the filter or ordering.
    pub fn to_statement(&self) -> Result<Statement, ConfigurationError> {
        if let Some(e) = &self.error {
            return Err(e.clone());
        }
        assembler::assemble(
            self.schema,
            &self.plan,
            NodeId::ROOT,
            self.filter.as_ref(),
            &self.order_by,
            self.limit,
        )
    }

    /// Fetch every matching root row with all declared paths loaded.
    pub fn all<E: LifeExecutor + ?Sized>(&self, executor: &E) -> Result<Fetched<'s>, LifeError> {
        let statement = self.to_statement()?;
        prefetch::execute(self.schema, &self.plan, &statement, executor, self.config)
    }

    /// Fetch the first matching root row (`LIMIT 1`) with its declared
    /// paths loaded.
    ///
    /// # Errors
    ///
    /// `LifeError::NotFound` when no row matches.
    pub fn get<E: LifeExecutor + ?Sized>(&self, executor: &E) -> Result<FetchedOne<'s>, LifeError> {
        let mut statement = self.to_statement()?;
        statement.limit = Some(1);
        let fetched = prefetch::execute(self.schema, &self.plan, &statement, executor, self.config)?;
        FetchedOne::from_fetched(fetched).ok_or_else(|| {
            LifeError::NotFound(format!(
                "no `{}` row matches the query",
                self.schema.entity(self.plan.root().entity).name
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::filter::col;

    fn schema() -> (Schema, EntityId, RelationId) {
        let mut b = Schema::builder();
        let user = b.entity("User", "users", "id", &["id", "username"]).unwrap();
        let blog = b.entity("Blog", "blog", "pk", &["pk", "user_id", "title"]).unwrap();
        let blog_user = b.belongs_to(blog, "user", user, "user_id", Some("blog_set")).unwrap();
        (b.build(), blog, blog_user)
    }

    #[test]
    fn test_plus_is_idempotent() {
        let (schema, blog, blog_user) = schema();
        let query = SelectPlus::new(&schema, blog).plus([blog_user]).plus([blog_user]);
        assert_eq!(query.plan().len(), 2);
        let statement = query.to_statement().unwrap();
        assert_eq!(statement.joins.len(), 1);
    }

    #[test]
    fn test_declaration_error_is_deferred() {
        let (schema, blog, blog_user) = schema();
        let user = schema.entity_by_name("User").unwrap();
        let blog_set = schema.relation(user, "blog_set").unwrap();

        // Blog -> User -> Blog -> User chains; Blog -> Blog.blog_set does not
        let query = SelectPlus::new(&schema, blog)
            .plus([blog_set])
            .plus([blog_user])
            .filter(col("users", "username").eq("alice"));
        assert_eq!(query.plan().len(), 2);
        let err = query.to_statement().unwrap_err();
        assert!(matches!(err, ConfigurationError::BrokenPath { position: 0, .. }));
    }

    #[test]
    fn test_filters_are_combined() {
        let (schema, blog, blog_user) = schema();
        let statement = SelectPlus::new(&schema, blog)
            .plus([blog_user])
            .filter(col("users", "username").eq("alice"))
            .filter(col("blog", "title").ne("draft"))
            .limit(5)
            .to_statement()
            .unwrap();
        match statement.filter {
            Some(Filter::And(parts)) => assert_eq!(parts.len(), 2),
            other => panic!("unexpected filter {other:?}"),
        }
        assert_eq!(statement.limit, Some(5));
    }

    #[test]
    fn test_try_plus_reports_immediately() {
        let (schema, blog, _) = schema();
        let mut query = SelectPlus::new(&schema, blog);
        assert_eq!(query.try_plus(&[]).unwrap_err(), ConfigurationError::EmptyPath);
        // try_plus does not poison the builder
        assert!(query.to_statement().is_ok());
    }
}
