//! HTML rendered by the gateway. URLs come from validated configuration and
//! are inserted verbatim; any other text is escaped with [`ammonia::clean_text`].

use crate::client::RelayError;

pub fn upload_form(reset_url: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Image Detection</title>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 20px; }}
        .container {{ max-width: 800px; margin: auto; padding: 20px; border: 1px solid #ccc; border-radius: 8px; }}
        h1 {{ text-align: center; }}
        button {{ padding: 10px; margin-top: 10px; }}
        input[type="file"] {{ margin-bottom: 10px; }}
    </style>
    <script>
        // Start every visit from an empty result store.
        window.onload = function () {{
            fetch("{reset_url}", {{ method: "GET" }})
                .then(response => response.json())
                .then(data => console.log(data.message))
                .catch(error => console.error("Error resetting results:", error));
        }};
    </script>
</head>
<body>
    <div class="container">
        <h1>Upload Images for Detection</h1>
        <form action="/upload_and_detect/" method="post" enctype="multipart/form-data">
            <label for="files">Select images to upload:</label>
            <input type="file" id="files" name="files" accept="image/*" multiple required>
            <button type="submit">Upload and Detect</button>
        </form>
    </div>
</body>
</html>
"#
    )
}

pub fn no_files() -> String {
    "<h1>No files received</h1>".to_string()
}

pub fn download_link(zip_url: &str) -> String {
    format!(
        "<h1>Detection Results</h1>\
         <p>Processing complete. Your results are ready for download.</p>\
         <a href='{zip_url}'><button>Download All Results (ZIP)</button></a>"
    )
}

pub fn relay_error(error: &RelayError) -> String {
    format!("<h1>{}</h1>", ammonia::clean_text(&error.to_string()))
}

pub fn upload_error(message: &str) -> String {
    format!(
        "<h1>Upload failed</h1><p>{}</p>",
        ammonia::clean_text(message)
    )
}
