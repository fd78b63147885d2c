//! Static pages served by the daemon.

/// Entry page: uploads the reference photo and polls `/api/status` once a
/// second until the daemon reports a navigation target.
pub const INDEX: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>facegate</title>
<style>
body { font-family: sans-serif; max-width: 32rem; margin: 3rem auto; }
#bar { height: 1rem; background: #ddd; }
#fill { height: 100%; width: 5%; background: #c33; transition: width .3s; }
#fill.match { background: #3a3; }
</style>
</head>
<body>
<h1>Face verification</h1>
<p><input type="file" id="photo" accept="image/*"> <button id="upload">Enroll</button></p>
<p id="message"></p>
<div id="bar"><div id="fill"></div></div>
<p id="result">Waiting for enrollment</p>
<script>
const message = document.getElementById("message");
const fill = document.getElementById("fill");
const result = document.getElementById("result");

document.getElementById("upload").onclick = async () => {
  const file = document.getElementById("photo").files[0];
  if (!file) return;
  const resp = await fetch("/api/enroll", { method: "POST", body: file });
  const body = await resp.json();
  message.textContent = resp.ok ? "Enrolled as " + body.label : body.error;
};

async function poll() {
  const resp = await fetch("/api/status");
  const s = await resp.json();
  if (s.last_result) {
    fill.style.width = s.display_percentage + "%";
    fill.className = s.last_result.is_match ? "match" : "";
    result.textContent = s.last_result.label + " (" + s.last_result.percentage + "%)";
  } else if (s.enrollment) {
    result.textContent = "Looking for a face";
  }
  if (s.navigate_to) {
    window.location.href = s.navigate_to;
  }
}
setInterval(poll, 1000);
</script>
</body>
</html>
"#;

pub const SUCCESS: &str = r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><title>facegate: verified</title></head>
<body>
<h1>Verified</h1>
<p>Your face matched the enrolled photo.</p>
<button id="reset">Start over</button>
<script>
document.getElementById("reset").onclick = async () => {
  await fetch("/api/session/reset", { method: "POST" });
  window.location.href = "/";
};
</script>
</body>
</html>
"#;

pub const NOT_FOUND: &str = r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><title>facegate: not found</title></head>
<body><h1>404</h1><p>Nothing here. <a href="/">Back</a></p></body>
</html>
"#;
