use rand::RngExt;

const CHROME_VERSIONS: [&str; 12] = [
    "141.0.7390.76",
    "141.0.7390.65",
    "140.0.7339.207",
    "140.0.7339.185",
    "139.0.7258.154",
    "139.0.7258.127",
    "138.0.7204.183",
    "138.0.7204.157",
    "137.0.7151.119",
    "137.0.7151.103",
    "136.0.7103.113",
    "135.0.7049.114",
];

const FIREFOX_VERSIONS: [&str; 8] = [
    "144.0", "143.0", "142.0", "141.0", "140.0", "139.0", "138.0", "128.0",
];

const EDGE_VERSIONS: [&str; 6] = [
    "141.0.3537.71",
    "141.0.3537.57",
    "140.0.3485.94",
    "140.0.3485.66",
    "139.0.3405.125",
    "138.0.3351.121",
];

/// 只用桌面版，部分銀行網站對行動版會回傳不同的版面
const DESKTOP_OS: [&str; 8] = [
    "Windows NT 10.0; Win64; x64",
    "Windows NT 10.0; Win64; x64",
    "Windows NT 10.0; Win64; x64",
    "Macintosh; Intel Mac OS X 10_15_7",
    "Macintosh; Intel Mac OS X 14_7_1",
    "Macintosh; Intel Mac OS X 15_6",
    "X11; Linux x86_64",
    "X11; Ubuntu; Linux x86_64",
];

fn gen_chrome_ua() -> String {
    let mut rng = rand::rng();
    let version = CHROME_VERSIONS[rng.random_range(0..CHROME_VERSIONS.len())];
    let os = DESKTOP_OS[rng.random_range(0..DESKTOP_OS.len())];

    format!(
        "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{} Safari/537.36",
        os, version
    )
}

fn gen_firefox_ua() -> String {
    let mut rng = rand::rng();
    let version = FIREFOX_VERSIONS[rng.random_range(..FIREFOX_VERSIONS.len())];
    let os = DESKTOP_OS[rng.random_range(..DESKTOP_OS.len())];

    format!(
        "Mozilla/5.0 ({}; rv:{}) Gecko/20100101 Firefox/{}",
        os, version, version
    )
}

fn gen_edge_ua() -> String {
    let mut rng = rand::rng();
    let version = EDGE_VERSIONS[rng.random_range(0..EDGE_VERSIONS.len())];
    // Edge 只取 Windows 與 macOS
    let os = DESKTOP_OS[rng.random_range(0..6)];
    let chrome_ver = version.split('.').next().unwrap_or("141");

    format!(
        "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{}.0.0.0 Safari/537.36 Edg/{}",
        os, chrome_ver, version
    )
}

/// 隨機產生桌面瀏覽器的 User-Agent，Chrome 的比例最高
pub fn gen_random_ua() -> String {
    let mut rng = rand::rng();
    match rng.random_range(0..10) {
        0..=5 => gen_chrome_ua(),
        6..=7 => gen_firefox_ua(),
        _ => gen_edge_ua(),
    }
}
