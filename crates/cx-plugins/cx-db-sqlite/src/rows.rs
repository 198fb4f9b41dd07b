//! Row mapping and single-statement selects shared by pooled reads and
//! transactional sessions.

use cx_core::models::{AuditFields, Director, Genre, Movie, MovieDetail, Reaction, Role, User};
use cx_core::pagination::SortField;
use cx_core::UniqueViolation;
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, QueryBuilder, Row, Sqlite};

pub(crate) const MOVIE_COLUMNS: &str = "m.id, m.title, m.creator_id, m.director_id, m.detail_id, \
     m.like_count, m.dislike_count, m.movie_file_path, m.created_at, m.updated_at, m.version";

const GENRE_COLUMNS: &str = "g.id, g.name, g.created_at, g.updated_at, g.version";

pub(crate) fn column(field: SortField) -> &'static str {
    match field {
        SortField::Id => "m.id",
        SortField::Title => "m.title",
        SortField::LikeCount => "m.like_count",
        SortField::DislikeCount => "m.dislike_count",
    }
}

/// Translates unique-constraint failures into [`UniqueViolation`].
pub(crate) fn write_error(err: sqlx::Error, what: &str) -> anyhow::Error {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => UniqueViolation(what.to_string()).into(),
        _ => anyhow::Error::new(err),
    }
}

/// Appends `(?, ?, ...)` binding every id.
pub(crate) fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, ids: &[i64]) {
    qb.push("(");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
}

fn audit(row: &SqliteRow) -> sqlx::Result<AuditFields> {
    Ok(AuditFields {
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        version: row.try_get("version")?,
    })
}

pub(crate) fn movie_from_row(row: &SqliteRow) -> sqlx::Result<Movie> {
    Ok(Movie {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        creator_id: row.try_get("creator_id")?,
        director_id: row.try_get("director_id")?,
        detail_id: row.try_get("detail_id")?,
        like_count: row.try_get("like_count")?,
        dislike_count: row.try_get("dislike_count")?,
        movie_file_path: row.try_get("movie_file_path")?,
        audit: audit(row)?,
    })
}

pub(crate) fn director_from_row(row: &SqliteRow) -> sqlx::Result<Director> {
    Ok(Director {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        dob: row.try_get("dob")?,
        nationality: row.try_get("nationality")?,
        audit: audit(row)?,
    })
}

pub(crate) fn genre_from_row(row: &SqliteRow) -> sqlx::Result<Genre> {
    Ok(Genre {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        audit: audit(row)?,
    })
}

fn detail_from_row(row: &SqliteRow) -> sqlx::Result<MovieDetail> {
    Ok(MovieDetail {
        id: row.try_get("id")?,
        detail: row.try_get("detail")?,
        audit: audit(row)?,
    })
}

pub(crate) fn user_from_row(row: &SqliteRow) -> sqlx::Result<User> {
    let rank: i64 = row.try_get("role")?;
    let role = u8::try_from(rank)
        .ok()
        .and_then(|rank| Role::try_from(rank).ok())
        .ok_or_else(|| sqlx::Error::Decode(format!("invalid role rank {rank}").into()))?;

    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password: row.try_get("password")?,
        role,
        audit: audit(row)?,
    })
}

pub(crate) fn reaction_from_row(row: &SqliteRow) -> sqlx::Result<Reaction> {
    Ok(Reaction {
        movie_id: row.try_get("movie_id")?,
        user_id: row.try_get("user_id")?,
        is_like: row.try_get("is_like")?,
    })
}

pub(crate) async fn select_movie<'c, E>(exec: E, id: i64) -> sqlx::Result<Option<Movie>>
where
    E: Executor<'c, Database = Sqlite>,
{
    let sql = format!("SELECT {MOVIE_COLUMNS} FROM movies m WHERE m.id = ?");
    sqlx::query(&sql)
        .bind(id)
        .fetch_optional(exec)
        .await?
        .map(|row| movie_from_row(&row))
        .transpose()
}

pub(crate) async fn select_director<'c, E>(exec: E, id: i64) -> sqlx::Result<Option<Director>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query("SELECT * FROM directors WHERE id = ?")
        .bind(id)
        .fetch_optional(exec)
        .await?
        .map(|row| director_from_row(&row))
        .transpose()
}

pub(crate) async fn select_directors<'c, E>(exec: E, ids: &[i64]) -> sqlx::Result<Vec<Director>>
where
    E: Executor<'c, Database = Sqlite>,
{
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM directors WHERE id IN ");
    push_id_list(&mut qb, ids);
    qb.build().fetch_all(exec).await?.iter().map(director_from_row).collect()
}

pub(crate) async fn select_detail<'c, E>(exec: E, id: i64) -> sqlx::Result<Option<MovieDetail>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query("SELECT * FROM movie_details WHERE id = ?")
        .bind(id)
        .fetch_optional(exec)
        .await?
        .map(|row| detail_from_row(&row))
        .transpose()
}

pub(crate) async fn select_genres<'c, E>(exec: E, ids: &[i64]) -> sqlx::Result<Vec<Genre>>
where
    E: Executor<'c, Database = Sqlite>,
{
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {GENRE_COLUMNS} FROM genres g WHERE g.id IN "));
    push_id_list(&mut qb, ids);
    qb.push(" ORDER BY g.id");
    qb.build().fetch_all(exec).await?.iter().map(genre_from_row).collect()
}

/// Genres joined to each of the given movies, as `(movie_id, genre)` pairs.
pub(crate) async fn select_movie_genres<'c, E>(exec: E, movie_ids: &[i64]) -> sqlx::Result<Vec<(i64, Genre)>>
where
    E: Executor<'c, Database = Sqlite>,
{
    if movie_ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "SELECT mg.movie_id, {GENRE_COLUMNS} FROM movie_genres mg \
         JOIN genres g ON g.id = mg.genre_id WHERE mg.movie_id IN "
    ));
    push_id_list(&mut qb, movie_ids);
    qb.push(" ORDER BY g.id");
    qb.build()
        .fetch_all(exec)
        .await?
        .iter()
        .map(|row| -> sqlx::Result<(i64, Genre)> { Ok((row.try_get("movie_id")?, genre_from_row(row)?)) })
        .collect()
}
