//! Embedded portal page.
//!
//! One self-contained HTML page: lists nearby networks from `/scan`, posts
//! the credential form to `/connect` and polls `/success` until the device
//! confirms the station link. Served for `/` and for every captive-portal
//! probe path.

pub const SETUP_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <meta charset="UTF-8">
  <title>USB Identifier Setup</title>
  <style>
    body{font-family:Arial,sans-serif;margin:0;padding:20px;background:#f5f5f5;text-align:center}
    .container{max-width:400px;margin:0 auto;background:#fff;padding:20px;border-radius:10px;box-shadow:0 2px 10px rgba(0,0,0,.1)}
    h1{color:#333}
    .form-group{margin-bottom:15px;text-align:left}
    label{display:block;margin-bottom:5px;font-weight:bold}
    input{width:100%;padding:8px;box-sizing:border-box;border:1px solid #ddd;border-radius:4px}
    button{background:#4285f4;color:#fff;border:none;padding:10px 15px;border-radius:4px;cursor:pointer;font-weight:bold}
    #networks{max-height:200px;overflow-y:auto;margin-bottom:15px;border:1px solid #ddd;border-radius:4px}
    .network{padding:8px;border-bottom:1px solid #ddd;cursor:pointer}
    .network:hover{background:rgba(0,0,0,.05)}
    .signal{float:right;color:#666}
    .status{padding:10px;margin-top:10px;border-radius:4px;display:none}
    .error{background:#ffebee;color:#c62828}
    .success{background:#e8f5e9;color:#2e7d32}
  </style>
</head>
<body>
  <div class="container">
    <h1>USB Identifier Setup</h1>
    <p>Select your Wi-Fi network and enter the password to connect the device.</p>
    <div id="networks"><p id="scanning">Scanning for networks...</p></div>
    <form id="wifi-form" onsubmit="return submitForm()">
      <div class="form-group">
        <label for="ssid">Network Name (SSID):</label>
        <input type="text" id="ssid" name="ssid" required>
      </div>
      <div class="form-group">
        <label for="password">Password:</label>
        <input type="password" id="password" name="password">
      </div>
      <div class="form-group">
        <label for="redirect_url">Redirect URL (optional):</label>
        <input type="text" id="redirect_url" name="redirect_url" placeholder="https://example.com">
      </div>
      <button type="submit">Connect</button>
    </form>
    <div id="status-message" class="status"></div>
  </div>
  <script>
    window.onload = function() { fetchNetworks(); setInterval(fetchNetworks, 5000); };

    function fetchNetworks() {
      fetch('/scan').then(function(r) { return r.json(); }).then(function(data) {
        var div = document.getElementById('networks');
        div.innerHTML = '';
        if (data.length === 0) {
          div.innerHTML = '<p id="scanning">No networks found yet...</p>';
          return;
        }
        data.forEach(function(n) {
          var row = document.createElement('div');
          row.className = 'network';
          row.innerHTML = n.ssid + '<span class="signal">' + n.rssi + ' dBm</span>';
          row.onclick = function() {
            document.getElementById('ssid').value = n.ssid;
            document.getElementById('password').focus();
          };
          div.appendChild(row);
        });
      }).catch(function() {});
    }

    function submitForm() {
      var ssid = document.getElementById('ssid').value;
      if (!ssid) { showStatus('Please select a network', 'error'); return false; }
      showStatus('Connecting to ' + ssid + '...', '');
      fetch('/connect', {
        method: 'POST',
        body: new URLSearchParams(new FormData(document.getElementById('wifi-form')))
      }).then(function() { pollSuccess(); })
        .catch(function(e) { showStatus('Error connecting: ' + e, 'error'); });
      return false;
    }

    function pollSuccess() {
      var poll = setInterval(function() {
        fetch('/success').then(function(r) {
          if (r.ok) {
            clearInterval(poll);
            showStatus('Connection successful!', 'success');
            var url = document.getElementById('redirect_url').value;
            if (url) { setTimeout(function() { window.location.href = url; }, 3000); }
          }
        }).catch(function() {});
      }, 1000);
      setTimeout(function() {
        clearInterval(poll);
        showStatus('Connection attempt timed out. Check the password and try again.', 'error');
      }, 20000);
    }

    function showStatus(message, kind) {
      var el = document.getElementById('status-message');
      el.textContent = message;
      el.className = 'status ' + kind;
      el.style.display = 'block';
    }
  </script>
</body>
</html>
"#;
