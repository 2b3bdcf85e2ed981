//! Book catalog endpoints: CRUD, listing, bulk import/export, and
//! recommendations.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::AppState;
use crate::db::{
    BookFilter, BookRecord, BookSort, CreateBook, Genre, PageRequest, RecommendBy, UpdateBook,
};
use crate::error::ApiError;
use crate::services::auth::AuthUser;
use crate::services::importer;

/// Oldest accepted publication year.
pub const MIN_PUBLISHED_YEAR: i32 = 1800;

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct BookPayload {
    pub title: String,
    pub author: String,
    pub genre: Genre,
    pub published_year: i32,
}

impl BookPayload {
    fn validate(self) -> Result<CreateBook, ApiError> {
        Ok(CreateBook {
            title: non_empty("title", &self.title)?,
            author: non_empty("author", &self.author)?,
            genre: self.genre,
            published_year: year_in_range(self.published_year)?,
        })
    }
}

/// Partial update body; omitted fields are left untouched.
#[derive(Debug, Default, Deserialize)]
pub struct BookPatch {
    pub title: Option<String>,
    pub author: Option<String>,
    pub genre: Option<Genre>,
    pub published_year: Option<i32>,
}

impl BookPatch {
    fn validate(self) -> Result<UpdateBook, ApiError> {
        Ok(UpdateBook {
            title: self.title.as_deref().map(|t| non_empty("title", t)).transpose()?,
            author: self.author.as_deref().map(|a| non_empty("author", a)).transpose()?,
            genre: self.genre,
            published_year: self.published_year.map(year_in_range).transpose()?,
        })
    }
}

fn non_empty(field: &str, value: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::Validation(format!("{field} must be non-empty")));
    }
    Ok(value.to_string())
}

fn year_in_range(year: i32) -> Result<i32, ApiError> {
    let current = Utc::now().year();
    if year < MIN_PUBLISHED_YEAR || year > current {
        return Err(ApiError::Validation(format!(
            "published_year must be between {MIN_PUBLISHED_YEAR} and {current}"
        )));
    }
    Ok(year)
}

// ============================================================================
// Listing
// ============================================================================

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    10
}

fn default_sort_by() -> String {
    "title".to_string()
}

fn default_sort_order() -> String {
    "asc".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ListBooksQuery {
    pub title: Option<String>,
    pub author: Option<String>,
    pub genre: Option<String>,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
    #[serde(default = "default_sort_by")]
    pub sort_by: String,
    #[serde(default = "default_sort_order")]
    pub sort_order: String,
}

/// A listing page; `sort_by`/`sort_order` echo the normalized values that
/// were actually applied.
#[derive(Debug, Serialize)]
pub struct BooksPageOut {
    pub items: Vec<BookRecord>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub sort_by: &'static str,
    pub sort_order: &'static str,
}

async fn list_books(
    State(state): State<AppState>,
    Query(query): Query<ListBooksQuery>,
) -> Result<Json<BooksPageOut>, ApiError> {
    if query.page < 1 {
        return Err(ApiError::Validation("page must be at least 1".to_string()));
    }
    if !(1..=PageRequest::MAX_PAGE_SIZE).contains(&query.page_size) {
        return Err(ApiError::Validation(format!(
            "page_size must be between 1 and {}",
            PageRequest::MAX_PAGE_SIZE
        )));
    }
    if query.year_from.is_some_and(|y| y < MIN_PUBLISHED_YEAR) {
        return Err(ApiError::Validation(format!(
            "year_from must be at least {MIN_PUBLISHED_YEAR}"
        )));
    }

    let filter = BookFilter {
        title: query.title.filter(|s| !s.is_empty()),
        author: query.author.filter(|s| !s.is_empty()),
        genre: query.genre.filter(|s| !s.is_empty()),
        year_from: query.year_from,
        year_to: query.year_to,
    };
    let sort = BookSort::parse(&query.sort_by, &query.sort_order);
    let page = PageRequest::new(query.page, query.page_size);

    let result = state.db.books().list(&filter, sort, page).await?;

    Ok(Json(BooksPageOut {
        items: result.items,
        total: result.total,
        page: page.page(),
        page_size: page.page_size(),
        sort_by: sort.key.as_str(),
        sort_order: sort.direction.as_str(),
    }))
}

// ============================================================================
// CRUD
// ============================================================================

async fn create_book(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(payload): Json<BookPayload>,
) -> Result<Json<BookRecord>, ApiError> {
    let book = payload.validate()?;
    let record = state.db.books().create(book).await?;
    tracing::info!(book_id = record.id, "created book");
    Ok(Json(record))
}

async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<BookRecord>, ApiError> {
    state
        .db
        .books()
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Book not found".to_string()))
}

async fn update_book(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    _user: AuthUser,
    Json(payload): Json<BookPatch>,
) -> Result<Json<BookRecord>, ApiError> {
    let patch = payload.validate()?;
    state
        .db
        .books()
        .update(id, patch)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Book not found or not updated".to_string()))
}

async fn delete_book(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    _user: AuthUser,
) -> Result<Json<Value>, ApiError> {
    if !state.db.books().delete(id).await? {
        return Err(ApiError::NotFound("Book not found".to_string()));
    }
    tracing::info!(book_id = id, "deleted book");
    Ok(Json(json!({ "status": "deleted", "id": id })))
}

// ============================================================================
// Bulk import/export
// ============================================================================

async fn import_books(
    State(state): State<AppState>,
    _user: AuthUser,
    mut multipart: Multipart,
) -> Result<Json<importer::ImportReport>, ApiError> {
    let mut filename = String::new();
    let mut data: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Import failed: {e}")))?
    {
        if field.name() == Some("file") {
            filename = field.file_name().unwrap_or("upload.csv").to_string();
            data = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Import failed: {e}")))?
                    .to_vec(),
            );
            break;
        }
    }

    let data = data.ok_or_else(|| ApiError::BadRequest("Import failed: no file provided".to_string()))?;
    let rows = importer::parse_records(&filename, &data).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let report = importer::import_books(&state.db.books(), rows).await;
    tracing::info!(
        imported = report.imported,
        failed = report.errors.len(),
        "bulk import finished"
    );
    Ok(Json(report))
}

fn default_export_format() -> String {
    "json".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(default = "default_export_format")]
    pub format: String,
}

async fn export_books(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let rows = state.db.books().export_all().await?;

    match query.format.as_str() {
        "json" => Ok(Json(rows).into_response()),
        "csv" => {
            let body = importer::export_csv(&rows)?;
            let disposition = format!("attachment; filename={}", importer::export_filename());
            let headers = [
                (header::CONTENT_TYPE, HeaderValue::from_static("text/csv")),
                (
                    header::CONTENT_DISPOSITION,
                    HeaderValue::from_str(&disposition).map_err(anyhow::Error::new)?,
                ),
            ];
            Ok((headers, body).into_response())
        }
        other => Err(ApiError::Validation(format!(
            "format must be json or csv, got {other}"
        ))),
    }
}

// ============================================================================
// Recommendations
// ============================================================================

fn default_recommend_by() -> RecommendBy {
    RecommendBy::Genre
}

fn default_recommend_limit() -> i64 {
    5
}

#[derive(Debug, Deserialize)]
pub struct RecommendQuery {
    #[serde(default = "default_recommend_by")]
    pub by: RecommendBy,
    pub value: String,
    #[serde(default = "default_recommend_limit")]
    pub limit: i64,
}

async fn recommend_books(
    State(state): State<AppState>,
    Query(query): Query<RecommendQuery>,
) -> Result<Json<Vec<BookRecord>>, ApiError> {
    if !(1..=50).contains(&query.limit) {
        return Err(ApiError::Validation("limit must be between 1 and 50".to_string()));
    }

    let items = state
        .db
        .books()
        .recommend(query.by, &query.value, query.limit)
        .await?;

    if items.is_empty() {
        return Err(ApiError::NotFound("No recommendations found".to_string()));
    }

    Ok(Json(items))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/books", get(list_books).post(create_book))
        .route("/books/export", get(export_books))
        .route("/books/recommend", get(recommend_books))
        .route("/books/import", post(import_books))
        .route("/books/{id}", get(get_book).put(update_book).delete(delete_book))
}
