//! Transactional session used by the movie write paths.

use async_trait::async_trait;
use chrono::Utc;
use cx_core::models::{Director, Genre, MovieAggregate, MovieFieldUpdate, MovieInsert};
use cx_core::traits::CatalogTx;
use sqlx::{QueryBuilder, Sqlite, Transaction};

use crate::rows::{self, push_id_list, write_error};

pub struct SqliteTx {
    tx: Transaction<'static, Sqlite>,
}

impl SqliteTx {
    pub(crate) fn new(tx: Transaction<'static, Sqlite>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl CatalogTx for SqliteTx {
    async fn find_director(&mut self, id: i64) -> anyhow::Result<Option<Director>> {
        Ok(rows::select_director(&mut *self.tx, id).await?)
    }

    async fn find_genres(&mut self, ids: &[i64]) -> anyhow::Result<Vec<Genre>> {
        Ok(rows::select_genres(&mut *self.tx, ids).await?)
    }

    async fn load_aggregate(&mut self, id: i64) -> anyhow::Result<Option<MovieAggregate>> {
        let Some(movie) = rows::select_movie(&mut *self.tx, id).await? else {
            return Ok(None);
        };
        let detail = rows::select_detail(&mut *self.tx, movie.detail_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("movie {id} references missing detail {}", movie.detail_id))?;
        let genres = rows::select_movie_genres(&mut *self.tx, &[id])
            .await?
            .into_iter()
            .map(|(_, genre)| genre)
            .collect();

        Ok(Some(MovieAggregate { movie, detail, genres }))
    }

    async fn insert_detail(&mut self, body: &str) -> anyhow::Result<i64> {
        let now = Utc::now();
        let result = sqlx::query("INSERT INTO movie_details (detail, created_at, updated_at) VALUES (?, ?, ?)")
            .bind(body)
            .bind(now)
            .bind(now)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.last_insert_rowid())
    }

    async fn insert_movie(&mut self, row: &MovieInsert) -> anyhow::Result<i64> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO movies (title, creator_id, director_id, detail_id, movie_file_path, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(row.title.as_str())
        .bind(row.creator_id)
        .bind(row.director_id)
        .bind(row.detail_id)
        .bind(row.movie_file_path.as_str())
        .bind(now)
        .bind(now)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| write_error(e, &format!("movie titled `{}`", row.title)))?;
        Ok(result.last_insert_rowid())
    }

    async fn update_movie(&mut self, id: i64, fields: &MovieFieldUpdate) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE movies SET title = COALESCE(?, title), director_id = COALESCE(?, director_id), \
             updated_at = ?, version = version + 1 WHERE id = ?",
        )
        .bind(fields.title.as_deref())
        .bind(fields.director_id)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| write_error(e, "movie title"))?;
        Ok(())
    }

    async fn update_detail(&mut self, id: i64, body: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE movie_details SET detail = ?, updated_at = ?, version = version + 1 WHERE id = ?")
            .bind(body)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn add_genres(&mut self, movie_id: i64, genre_ids: &[i64]) -> anyhow::Result<()> {
        if genre_ids.is_empty() {
            return Ok(());
        }
        let mut qb = QueryBuilder::<Sqlite>::new("INSERT INTO movie_genres (movie_id, genre_id) ");
        qb.push_values(genre_ids, |mut row, genre_id| {
            row.push_bind(movie_id).push_bind(*genre_id);
        });
        qb.build().execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn remove_genres(&mut self, movie_id: i64, genre_ids: &[i64]) -> anyhow::Result<()> {
        if genre_ids.is_empty() {
            return Ok(());
        }
        let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM movie_genres WHERE movie_id = ");
        qb.push_bind(movie_id).push(" AND genre_id IN ");
        push_id_list(&mut qb, genre_ids);
        qb.build().execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> anyhow::Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> anyhow::Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
