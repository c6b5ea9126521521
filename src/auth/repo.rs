use crate::auth::repo_types::User;
use sqlx::PgPool;
use uuid::Uuid;

impl User {
    /// Find a user by (normalised) email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Create a new user with hashed password.
    /// Returns `None` if the email is already registered.
    pub async fn create(
        db: &PgPool,
        email: &str,
        password_hash: &str,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, password_hash)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO NOTHING
            RETURNING id, email, password_hash, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(password_hash)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn create_then_find_and_reject_duplicate(db: PgPool) {
        let user = User::create(&db, "jane@example.com", "$argon2id$stub")
            .await
            .unwrap()
            .expect("first insert creates the user");

        let by_email = User::find_by_email(&db, "jane@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, user.id);
        let by_id = User::find_by_id(&db, user.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "jane@example.com");

        let again = User::create(&db, "jane@example.com", "$argon2id$other").await.unwrap();
        assert!(again.is_none());
        assert!(User::find_by_email(&db, "nobody@example.com").await.unwrap().is_none());
    }
}
