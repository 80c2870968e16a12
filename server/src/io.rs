use bytes::Buf;
use futures::stream::{StreamExt, TryStreamExt};
use warp::filters::multipart::{FormData, Part};

use crate::errors::BackendError;

const METADATA_PART: &str = "recipe";
const IMAGE_PART: &str = "image";

const DEFAULT_IMAGE_EXTENSION: &str = "jpg";

/// The decomposed parts of a create/update form submission.
pub struct Submission {
    /// The raw JSON of the recipe metadata part.
    pub metadata: Vec<u8>,

    /// The uploaded image, if one was attached.
    pub image: Option<ImageUpload>,
}

pub struct ImageUpload {
    pub extension: String,
    pub data: Vec<u8>,
}

/// Splits a multipart submission into its named parts. The metadata
/// part is required; unknown parts are ignored.
pub async fn parse_submission(content: FormData) -> Result<Submission, BackendError> {
    let parts: Vec<Part> = content
        .try_collect()
        .await
        .map_err(|_| BackendError::MalformedFormSubmission)?;

    let mut metadata = None;
    let mut image = None;

    for part in parts {
        match part.name() {
            METADATA_PART => {
                metadata = Some(
                    part_as_vec(part)
                        .await
                        .map_err(|_| BackendError::MalformedFormSubmission)?,
                );
            }
            IMAGE_PART => {
                let extension = image_extension(&part);
                let data = part_as_vec(part)
                    .await
                    .map_err(|_| BackendError::MalformedFormSubmission)?;

                image = Some(ImageUpload { extension, data });
            }
            _ => {}
        }
    }

    Ok(Submission {
        metadata: metadata.ok_or(BackendError::PartsMissing)?,
        image,
    })
}

/// Collects chunks of [`Part`].
pub async fn part_as_vec(raw: Part) -> Result<Vec<u8>, ()> {
    let chunks = raw.stream().collect::<Vec<_>>().await;

    let mut data = vec![];

    for chunk in chunks {
        let mut chunk = chunk.map_err(|_| ())?;

        while chunk.has_remaining() {
            let bytes = chunk.copy_to_bytes(chunk.remaining());
            data.extend_from_slice(&bytes);
        }
    }

    Ok(data)
}

/// Picks a file extension for an uploaded image, preferring the
/// client-supplied file name, then the MIME subtype.
fn image_extension(part: &Part) -> String {
    if let Some(extension) = part
        .filename()
        .and_then(|name| name.rsplit_once('.').map(|(_, extension)| extension))
        .filter(|extension| !extension.is_empty())
    {
        return extension.to_ascii_lowercase();
    }

    part.content_type()
        .and_then(|t| t.parse::<mime::Mime>().ok())
        .map(|m| m.subtype().as_str().to_owned())
        .unwrap_or_else(|| DEFAULT_IMAGE_EXTENSION.to_owned())
}
