use async_trait::async_trait;

use crate::actions::{ActionArgs, ActionContext, ActionError, ActionHandler, ActionOutput};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "webp"];

pub struct ChangeWallpaper;

#[async_trait]
impl ActionHandler for ChangeWallpaper {
    async fn run(&self, args: &ActionArgs, ctx: &ActionContext) -> Result<ActionOutput, ActionError> {
        let image = args.existing_path("path")?;
        if !image.is_file() {
            return Err(ActionError::InvalidRequest(format!(
                "{} is not a file",
                image.display()
            )));
        }

        let is_image = image
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()));
        if !is_image {
            return Err(ActionError::InvalidRequest(format!(
                "{} is not an image ({})",
                image.display(),
                IMAGE_EXTENSIONS.join(", ")
            )));
        }

        ctx.desktop
            .set_wallpaper(image)
            .map_err(ActionError::os("cannot set wallpaper"))?;
        Ok(ActionOutput::message(format!("Wallpaper set to {}", image.display())))
    }
}
