//! Books repository: filtering, sorting, pagination, and mutations.
//!
//! Query construction is fully parameterized: filters produce WHERE
//! fragments plus bind values, sort fields come from a closed enum resolved
//! once at the boundary, and no client-supplied string is ever interpolated
//! into SQL.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Pool, StoreError, authors, is_unique_violation, now_iso8601};

/// The fixed genre set. Stored as TEXT and double-checked by the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Genre {
    Fiction,
    #[serde(rename = "Non-Fiction")]
    NonFiction,
    Science,
    History,
}

impl Genre {
    pub const ALL: [Genre; 4] = [Genre::Fiction, Genre::NonFiction, Genre::Science, Genre::History];

    pub fn as_str(self) -> &'static str {
        match self {
            Genre::Fiction => "Fiction",
            Genre::NonFiction => "Non-Fiction",
            Genre::Science => "Science",
            Genre::History => "History",
        }
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown genre: {0}")]
pub struct UnknownGenre(String);

impl FromStr for Genre {
    type Err = UnknownGenre;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Fiction" => Ok(Genre::Fiction),
            "Non-Fiction" => Ok(Genre::NonFiction),
            "Science" => Ok(Genre::Science),
            "History" => Ok(Genre::History),
            other => Err(UnknownGenre(other.to_string())),
        }
    }
}

// ============================================================================
// Sorting
// ============================================================================

/// Allow-listed sort fields for book listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Title,
    Author,
    PublishedYear,
}

impl SortKey {
    /// Map a client-supplied sort field onto the allow-list. Anything
    /// unrecognized silently falls back to the default instead of erroring.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "author" => SortKey::Author,
            "published_year" => SortKey::PublishedYear,
            _ => SortKey::Title,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Title => "title",
            SortKey::Author => "author",
            SortKey::PublishedYear => "published_year",
        }
    }

    fn column(self) -> &'static str {
        match self {
            SortKey::Title => "b.title",
            SortKey::Author => "a.name",
            SortKey::PublishedYear => "b.published_year",
        }
    }
}

/// Sort direction; only a case-insensitive "desc" selects descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    fn sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// A resolved sort specification (key + direction).
#[derive(Debug, Clone, Copy, Default)]
pub struct BookSort {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl BookSort {
    pub fn parse(sort_by: &str, sort_order: &str) -> Self {
        Self {
            key: SortKey::parse(sort_by),
            direction: SortDirection::parse(sort_order),
        }
    }

    /// ORDER BY clause. The id tie-breaker makes pagination deterministic
    /// regardless of storage order.
    fn order_clause(self) -> String {
        format!("ORDER BY {} {}, b.id ASC", self.key.column(), self.direction.sql())
    }
}

// ============================================================================
// Filtering
// ============================================================================

/// A bind value collected while building a parameterized query.
#[derive(Debug, Clone, PartialEq)]
enum SqlValue {
    Text(String),
    Int(i64),
}

/// Optional, independently combinable list filters. Absent fields impose no
/// constraint; supplied fields are ANDed together.
#[derive(Debug, Clone, Default)]
pub struct BookFilter {
    /// Title substring, case-insensitive
    pub title: Option<String>,
    /// Author-name substring, case-insensitive
    pub author: Option<String>,
    /// Exact genre match
    pub genre: Option<String>,
    /// Minimum published year (inclusive)
    pub year_from: Option<i32>,
    /// Maximum published year (inclusive)
    pub year_to: Option<i32>,
}

impl BookFilter {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.author.is_none()
            && self.genre.is_none()
            && self.year_from.is_none()
            && self.year_to.is_none()
    }

    /// WHERE fragments and the values to bind, in matching order.
    fn to_sql_conditions(&self) -> (Vec<String>, Vec<SqlValue>) {
        let mut conditions = Vec::new();
        let mut values = Vec::new();

        if let Some(title) = &self.title {
            conditions.push("lower(b.title) LIKE lower(?)".to_string());
            values.push(SqlValue::Text(format!("%{title}%")));
        }
        if let Some(author) = &self.author {
            conditions.push("lower(a.name) LIKE lower(?)".to_string());
            values.push(SqlValue::Text(format!("%{author}%")));
        }
        if let Some(genre) = &self.genre {
            conditions.push("b.genre = ?".to_string());
            values.push(SqlValue::Text(genre.clone()));
        }
        if let Some(from) = self.year_from {
            conditions.push("b.published_year >= ?".to_string());
            values.push(SqlValue::Int(from.into()));
        }
        if let Some(to) = self.year_to {
            conditions.push("b.published_year <= ?".to_string());
            values.push(SqlValue::Int(to.into()));
        }

        (conditions, values)
    }

    fn where_clause(conditions: &[String]) -> String {
        if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        }
    }
}

// ============================================================================
// Pagination
// ============================================================================

/// 1-based page request with a bounded page size.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    page: i64,
    page_size: i64,
}

impl PageRequest {
    pub const MAX_PAGE_SIZE: i64 = 100;

    pub fn new(page: i64, page_size: i64) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, Self::MAX_PAGE_SIZE),
        }
    }

    pub fn page(self) -> i64 {
        self.page
    }

    pub fn page_size(self) -> i64 {
        self.page_size
    }

    pub fn offset(self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, 10)
    }
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct BookRecord {
    pub id: i64,
    pub title: String,
    #[serde(skip_serializing)]
    pub author_id: i64,
    /// Author display name, joined in from the authors table
    pub author: String,
    pub genre: Genre,
    pub published_year: i32,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct CreateBook {
    pub title: String,
    pub author: String,
    pub genre: Genre,
    pub published_year: i32,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateBook {
    pub title: Option<String>,
    pub author: Option<String>,
    pub genre: Option<Genre>,
    pub published_year: Option<i32>,
}

impl UpdateBook {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.author.is_none()
            && self.genre.is_none()
            && self.published_year.is_none()
    }
}

/// One page of results plus the total cardinality of the predicate.
#[derive(Debug)]
pub struct BooksPage {
    pub items: Vec<BookRecord>,
    pub total: i64,
}

/// Flat row shape used by the bulk export endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct BookExport {
    pub id: i64,
    pub title: String,
    pub genre: Genre,
    pub published_year: i32,
    pub author: String,
}

/// Axis for the recommendation query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendBy {
    Genre,
    Author,
}

// ============================================================================
// Repository
// ============================================================================

type BookRow = (i64, String, i64, String, String, i32, String, String);

const BOOK_SELECT: &str = "SELECT b.id, b.title, b.author_id, a.name AS author, b.genre, \
     b.published_year, b.created_at, b.updated_at \
     FROM books b JOIN authors a ON a.id = b.author_id";

const COUNT_SELECT: &str = "SELECT COUNT(*) FROM books b JOIN authors a ON a.id = b.author_id";

const DUPLICATE_BOOK: &str = "a book with this title, author and published year";

fn book_from_row(row: BookRow) -> Result<BookRecord, StoreError> {
    let genre = row
        .4
        .parse::<Genre>()
        .map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))?;

    Ok(BookRecord {
        id: row.0,
        title: row.1,
        author_id: row.2,
        author: row.3,
        genre,
        published_year: row.5,
        created_at: row.6,
        updated_at: row.7,
    })
}

async fn fetch_book<'a, E>(executor: E, id: i64) -> Result<Option<BookRecord>, StoreError>
where
    E: sqlx::Executor<'a, Database = sqlx::Sqlite>,
{
    let sql = format!("{BOOK_SELECT} WHERE b.id = ?");
    let row = sqlx::query_as::<_, BookRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?;

    row.map(book_from_row).transpose()
}

pub struct BooksRepository {
    pool: Pool,
}

impl BooksRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// List books matching the filter, sorted and paginated.
    ///
    /// Runs the item query and a count query over the same predicate. The
    /// join is over a single-valued foreign key, so the count cannot be
    /// inflated by it. An offset past the last row yields an empty page
    /// with the correct total.
    pub async fn list(
        &self,
        filter: &BookFilter,
        sort: BookSort,
        page: PageRequest,
    ) -> Result<BooksPage, StoreError> {
        let (conditions, values) = filter.to_sql_conditions();
        let where_sql = BookFilter::where_clause(&conditions);

        let items_sql = format!("{BOOK_SELECT}{where_sql} {} LIMIT ? OFFSET ?", sort.order_clause());
        tracing::debug!(sql = %items_sql, "executing book list query");

        let mut query = sqlx::query_as::<_, BookRow>(&items_sql);
        for value in &values {
            query = match value {
                SqlValue::Text(s) => query.bind(s.as_str()),
                SqlValue::Int(i) => query.bind(*i),
            };
        }
        let rows = query
            .bind(page.page_size())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;
        let items = rows.into_iter().map(book_from_row).collect::<Result<Vec<_>, _>>()?;

        let count_sql = format!("{COUNT_SELECT}{where_sql}");
        let mut count = sqlx::query_scalar::<_, i64>(&count_sql);
        for value in &values {
            count = match value {
                SqlValue::Text(s) => count.bind(s.as_str()),
                SqlValue::Int(i) => count.bind(*i),
            };
        }
        let total = count.fetch_one(&self.pool).await?;

        Ok(BooksPage { items, total })
    }

    /// Get a book by id, with the author name joined in
    pub async fn get(&self, id: i64) -> Result<Option<BookRecord>, StoreError> {
        fetch_book(&self.pool, id).await
    }

    /// Create a book, resolving (or creating) its author first.
    pub async fn create(&self, book: CreateBook) -> Result<BookRecord, StoreError> {
        let author_id = authors::resolve(&self.pool, &book.author).await?;
        let now = now_iso8601();

        let mut tx = self.pool.begin().await?;
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO books (title, author_id, genre, published_year, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&book.title)
        .bind(author_id)
        .bind(book.genre.as_str())
        .bind(book.published_year)
        .bind(&now)
        .bind(&now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Duplicate(DUPLICATE_BOOK)
            } else {
                StoreError::Database(e)
            }
        })?;

        let record = fetch_book(&mut *tx, id)
            .await?
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
        tx.commit().await?;

        tracing::debug!(book_id = id, "inserted book");
        Ok(record)
    }

    /// Partial update. Only supplied fields are written; a supplied author
    /// name is re-resolved through the get-or-create path. Zero supplied
    /// fields is a no-op read-back that leaves `updated_at` untouched.
    /// Returns `None` (with nothing written) when the id does not exist.
    pub async fn update(&self, id: i64, update: UpdateBook) -> Result<Option<BookRecord>, StoreError> {
        if update.is_empty() {
            return self.get(id).await;
        }

        if !self.exists(id).await? {
            return Ok(None);
        }

        let author_id = match &update.author {
            Some(name) => Some(authors::resolve(&self.pool, name).await?),
            None => None,
        };

        let mut sets: Vec<&'static str> = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();
        if let Some(title) = update.title {
            sets.push("title = ?");
            values.push(SqlValue::Text(title));
        }
        if let Some(author_id) = author_id {
            sets.push("author_id = ?");
            values.push(SqlValue::Int(author_id));
        }
        if let Some(genre) = update.genre {
            sets.push("genre = ?");
            values.push(SqlValue::Text(genre.as_str().to_string()));
        }
        if let Some(year) = update.published_year {
            sets.push("published_year = ?");
            values.push(SqlValue::Int(year.into()));
        }

        let sql = format!("UPDATE books SET {}, updated_at = ? WHERE id = ?", sets.join(", "));

        let mut tx = self.pool.begin().await?;
        let mut query = sqlx::query(&sql);
        for value in &values {
            query = match value {
                SqlValue::Text(s) => query.bind(s.as_str()),
                SqlValue::Int(i) => query.bind(*i),
            };
        }
        let result = query
            .bind(now_iso8601())
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Duplicate(DUPLICATE_BOOK)
                } else {
                    StoreError::Database(e)
                }
            })?;

        if result.rows_affected() == 0 {
            // Deleted between the existence check and the update; the
            // transaction drops without writing anything.
            return Ok(None);
        }

        let record = fetch_book(&mut *tx, id).await?;
        tx.commit().await?;
        Ok(record)
    }

    /// Hard delete; false when the id does not exist
    pub async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM books WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// All books in flat export shape, ordered by id
    pub async fn export_all(&self) -> Result<Vec<BookExport>, StoreError> {
        let rows = sqlx::query_as::<_, (i64, String, String, i32, String)>(
            "SELECT b.id, b.title, b.genre, b.published_year, a.name AS author \
             FROM books b JOIN authors a ON a.id = b.author_id ORDER BY b.id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                let genre = r
                    .2
                    .parse::<Genre>()
                    .map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))?;
                Ok(BookExport {
                    id: r.0,
                    title: r.1,
                    genre,
                    published_year: r.3,
                    author: r.4,
                })
            })
            .collect()
    }

    /// Up to `limit` books along the given axis: exact genre match, or
    /// case-insensitive author-name substring.
    pub async fn recommend(
        &self,
        by: RecommendBy,
        value: &str,
        limit: i64,
    ) -> Result<Vec<BookRecord>, StoreError> {
        let rows = match by {
            RecommendBy::Genre => {
                let sql = format!("{BOOK_SELECT} WHERE b.genre = ? ORDER BY b.id ASC LIMIT ?");
                sqlx::query_as::<_, BookRow>(&sql)
                    .bind(value)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
            RecommendBy::Author => {
                let sql =
                    format!("{BOOK_SELECT} WHERE lower(a.name) LIKE lower(?) ORDER BY b.id ASC LIMIT ?");
                sqlx::query_as::<_, BookRow>(&sql)
                    .bind(format!("%{value}%"))
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.into_iter().map(book_from_row).collect()
    }

    async fn exists(&self, id: i64) -> Result<bool, StoreError> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT id FROM books WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // ========================================================================
    // Sort allow-list
    // ========================================================================

    #[test]
    fn sort_key_falls_back_to_title() {
        assert_eq!(SortKey::parse("title"), SortKey::Title);
        assert_eq!(SortKey::parse("author"), SortKey::Author);
        assert_eq!(SortKey::parse("published_year"), SortKey::PublishedYear);
        // Unrecognized input is not an error, it is the default.
        assert_eq!(SortKey::parse("id; DROP TABLE books"), SortKey::Title);
        assert_eq!(SortKey::parse(""), SortKey::Title);
        assert_eq!(SortKey::parse("TITLE"), SortKey::Title);
    }

    #[test]
    fn sort_direction_only_desc_descends() {
        assert_eq!(SortDirection::parse("desc"), SortDirection::Desc);
        assert_eq!(SortDirection::parse("DESC"), SortDirection::Desc);
        assert_eq!(SortDirection::parse("DeSc"), SortDirection::Desc);
        assert_eq!(SortDirection::parse("asc"), SortDirection::Asc);
        assert_eq!(SortDirection::parse("descending"), SortDirection::Asc);
        assert_eq!(SortDirection::parse(""), SortDirection::Asc);
    }

    #[test]
    fn order_clause_always_breaks_ties_by_id() {
        assert_eq!(
            BookSort::parse("title", "asc").order_clause(),
            "ORDER BY b.title ASC, b.id ASC"
        );
        assert_eq!(
            BookSort::parse("author", "desc").order_clause(),
            "ORDER BY a.name DESC, b.id ASC"
        );
        assert_eq!(
            BookSort::parse("published_year", "DESC").order_clause(),
            "ORDER BY b.published_year DESC, b.id ASC"
        );
        assert_eq!(
            BookSort::parse("bogus", "bogus").order_clause(),
            "ORDER BY b.title ASC, b.id ASC"
        );
    }

    // ========================================================================
    // Predicate builder
    // ========================================================================

    #[test]
    fn empty_filter_builds_no_conditions() {
        let filter = BookFilter::default();
        assert!(filter.is_empty());
        let (conditions, values) = filter.to_sql_conditions();
        assert!(conditions.is_empty());
        assert!(values.is_empty());
        assert_eq!(BookFilter::where_clause(&conditions), "");
    }

    #[test]
    fn substring_filters_are_wildcarded_and_bound() {
        let filter = BookFilter {
            title: Some("clean".to_string()),
            author: Some("martin".to_string()),
            ..Default::default()
        };
        let (conditions, values) = filter.to_sql_conditions();
        assert_eq!(
            conditions,
            vec![
                "lower(b.title) LIKE lower(?)".to_string(),
                "lower(a.name) LIKE lower(?)".to_string(),
            ]
        );
        assert_eq!(
            values,
            vec![
                SqlValue::Text("%clean%".to_string()),
                SqlValue::Text("%martin%".to_string()),
            ]
        );
    }

    #[test]
    fn all_filters_conjoin_in_order() {
        let filter = BookFilter {
            title: Some("a".to_string()),
            author: Some("b".to_string()),
            genre: Some("Fiction".to_string()),
            year_from: Some(1950),
            year_to: Some(2000),
        };
        let (conditions, values) = filter.to_sql_conditions();
        assert_eq!(conditions.len(), 5);
        assert_eq!(values.len(), 5);
        assert_eq!(
            BookFilter::where_clause(&conditions),
            " WHERE lower(b.title) LIKE lower(?) AND lower(a.name) LIKE lower(?) \
             AND b.genre = ? AND b.published_year >= ? AND b.published_year <= ?"
        );
        assert_eq!(values[3], SqlValue::Int(1950));
        assert_eq!(values[4], SqlValue::Int(2000));
    }

    #[test]
    fn year_bounds_are_independent() {
        let filter = BookFilter {
            year_to: Some(1900),
            ..Default::default()
        };
        let (conditions, values) = filter.to_sql_conditions();
        assert_eq!(conditions, vec!["b.published_year <= ?".to_string()]);
        assert_eq!(values, vec![SqlValue::Int(1900)]);
    }

    // ========================================================================
    // Pagination math
    // ========================================================================

    #[test]
    fn page_request_offset() {
        assert_eq!(PageRequest::new(1, 10).offset(), 0);
        assert_eq!(PageRequest::new(2, 10).offset(), 10);
        assert_eq!(PageRequest::new(7, 25).offset(), 150);
    }

    #[test]
    fn page_request_clamps_bounds() {
        let page = PageRequest::new(0, 0);
        assert_eq!(page.page(), 1);
        assert_eq!(page.page_size(), 1);

        let page = PageRequest::new(-5, 10_000);
        assert_eq!(page.page(), 1);
        assert_eq!(page.page_size(), PageRequest::MAX_PAGE_SIZE);

        let page = PageRequest::default();
        assert_eq!(page.page(), 1);
        assert_eq!(page.page_size(), 10);
    }

    // ========================================================================
    // Genre
    // ========================================================================

    #[test]
    fn genre_round_trips_through_strings() {
        for genre in Genre::ALL {
            assert_eq!(genre.as_str().parse::<Genre>().unwrap(), genre);
        }
        assert!("Poetry".parse::<Genre>().is_err());
        assert!("fiction".parse::<Genre>().is_err());
    }

    #[test]
    fn genre_serializes_with_hyphenated_non_fiction() {
        assert_eq!(
            serde_json::to_value(Genre::NonFiction).unwrap(),
            serde_json::json!("Non-Fiction")
        );
        assert_eq!(
            serde_json::from_value::<Genre>(serde_json::json!("Non-Fiction")).unwrap(),
            Genre::NonFiction
        );
    }
}
