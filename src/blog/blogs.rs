use serde_json::json;

use crate::blog::error::{ApiError, ApiResult};
use crate::blog::models::{Blog, Comment, User};
use crate::blog::page::Page;
use crate::{Database, FindAll, Model};

/// Number of blogs on one listing page.
pub const PAGE_SIZE: u64 = 10;

fn check_admin(user: Option<&User>) -> ApiResult<&User> {
    match user {
        Some(user) if user.admin == Some(true) => Ok(user),
        _ => Err(ApiError::Permission("admin required".to_string())),
    }
}

fn required(field: &str, value: &str) -> ApiResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::value(field, &format!("{field} cannot be empty.")));
    }
    Ok(value.to_string())
}

/// Publishes a blog. Only admins may write.
pub async fn create_blog(
    db: &Database,
    author: Option<&User>,
    name: &str,
    summary: &str,
    content: &str,
) -> ApiResult<Blog> {
    let author = check_admin(author)?;
    let mut blog = Blog {
        user_id: author.id.clone(),
        user_name: author.name.clone(),
        user_image: author.image.clone(),
        name: Some(required("name", name)?),
        summary: Some(required("summary", summary)?),
        content: Some(required("content", content)?),
        ..Default::default()
    };
    blog.save(db).await?;
    Ok(blog)
}

pub async fn get_blog(db: &Database, id: &str) -> ApiResult<Blog> {
    Blog::find(db, id).await?.ok_or_else(|| ApiError::NotFound {
        resource: "blog".to_string(),
    })
}

/// Newest blogs first, one page at a time.
pub async fn list_blogs(db: &Database, page_index: u64) -> ApiResult<(Page, Vec<Blog>)> {
    let count = Blog::find_number(db, "count(id)", None, Vec::new())
        .await?
        .and_then(|v| v.as_u64())
        .unwrap_or_default();
    let page = Page::new(count, page_index, PAGE_SIZE);
    if page.is_empty() {
        return Ok((page, Vec::new()));
    }
    let blogs = Blog::find_all(
        db,
        FindAll::new()
            .order_by("created_at desc")
            .limit_range(page.offset, page.limit),
    )
    .await?;
    Ok((page, blogs))
}

/// Deletes a blog and its comments.
pub async fn delete_blog(db: &Database, user: Option<&User>, id: &str) -> ApiResult<()> {
    check_admin(user)?;
    let blog = get_blog(db, id).await?;
    for comment in comments_for_blog(db, id).await? {
        comment.remove(db).await?;
    }
    blog.remove(db).await?;
    Ok(())
}

pub async fn create_comment(db: &Database, author: Option<&User>, blog_id: &str, content: &str) -> ApiResult<Comment> {
    let Some(author) = author else {
        return Err(ApiError::Permission("please sign in first".to_string()));
    };
    let blog = get_blog(db, blog_id).await?;
    let mut comment = Comment {
        blog_id: blog.id,
        user_id: author.id.clone(),
        user_name: author.name.clone(),
        user_image: author.image.clone(),
        content: Some(required("content", content)?),
        ..Default::default()
    };
    comment.save(db).await?;
    Ok(comment)
}

/// Oldest comment first.
pub async fn comments_for_blog(db: &Database, blog_id: &str) -> ApiResult<Vec<Comment>> {
    Ok(Comment::find_all(
        db,
        FindAll::new()
            .filter("blog_id=?", vec![json!(blog_id)])
            .order_by("created_at"),
    )
    .await?)
}
