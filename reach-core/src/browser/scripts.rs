//! In-page helpers evaluated through [`super::invoke`]. Every body is a single
//! arrow function taking one JSON argument.

pub const LOGIN_SIGNALS: &str = r#"(args) => {
    const any = (selectors) => selectors.some((s) => {
        try { return document.querySelector(s) !== null; } catch (_) { return false; }
    });
    let errorText = null;
    for (const s of args.errors) {
        try {
            const node = document.querySelector(s);
            if (node && node.textContent && node.textContent.trim()) {
                errorText = node.textContent.trim();
                break;
            }
        } catch (_) {}
    }
    return {
        chrome: any(args.chrome),
        login_form: any(args.login_form),
        title: document.title || '',
        error_text: errorText,
    };
}"#;

pub const DISMISS_INTERSTITIALS: &str = r#"(args) => {
    let clicked = 0;
    const wanted = args.labels.map((l) => l.toLowerCase());
    document.querySelectorAll('button, div[role="button"]').forEach((node) => {
        const label = (node.textContent || '').trim().toLowerCase();
        if (wanted.includes(label)) {
            try { node.click(); clicked += 1; } catch (_) {}
        }
    });
    return clicked;
}"#;

pub const PAGE_HEIGHT: &str = r#"(_args) => {
    const body = document.body ? document.body.scrollHeight : 0;
    const root = document.documentElement ? document.documentElement.scrollHeight : 0;
    return Math.max(body, root);
}"#;

pub const SCROLL_TO_BOTTOM: &str = r#"(_args) => {
    window.scrollTo(0, document.body ? document.body.scrollHeight : 0);
    return window.scrollY;
}"#;

pub const SCROLL_BY: &str = r#"(args) => {
    window.scrollBy({ top: args.delta, behavior: 'smooth' });
    return window.scrollY;
}"#;

pub const COLLECT_LINKS: &str = r#"(_args) => {
    const out = [];
    document.querySelectorAll('a[href]').forEach((a) => {
        const href = a.getAttribute('href');
        if (href) { out.push(href); }
    });
    return out;
}"#;

pub const SELECT_RECENT: &str = r#"(args) => {
    const wanted = args.labels.map((l) => l.toLowerCase());
    const nodes = document.querySelectorAll('a, button, div[role="tab"], span[role="tab"]');
    for (const node of nodes) {
        const label = (node.textContent || '').trim().toLowerCase();
        if (wanted.includes(label)) {
            node.click();
            return true;
        }
    }
    return false;
}"#;

pub const FAVORITE_STATE: &str = r#"(args) => {
    return args.markers.some((s) => {
        try { return document.querySelector(s) !== null; } catch (_) { return false; }
    });
}"#;

pub const FAVORITE_ENDPOINT: &str = r#"async (args) => {
    const fromCookie = document.cookie.split(';')
        .map((c) => c.trim())
        .find((c) => c.startsWith(args.cookie + '='));
    const meta = document.querySelector('meta[name="' + args.meta + '"]');
    const token = fromCookie ? fromCookie.split('=')[1] : (meta ? meta.getAttribute('content') : null);
    if (!token) {
        return { ok: false, status: 0, reason: 'token not found' };
    }
    const headers = { 'X-Requested-With': 'XMLHttpRequest' };
    headers[args.header] = token;
    try {
        const response = await fetch(args.endpoint, {
            method: 'POST',
            credentials: 'include',
            headers,
        });
        return { ok: response.ok, status: response.status, reason: null };
    } catch (err) {
        return { ok: false, status: 0, reason: String(err) };
    }
}"#;

pub const ITEM_CONTENT: &str = r#"(args) => {
    let text = '';
    for (const s of args.text) {
        try {
            const node = document.querySelector(s);
            if (!node) { continue; }
            const value = node.tagName === 'META' ? node.getAttribute('content') : node.textContent;
            if (value && value.trim().length > text.length) { text = value.trim(); }
        } catch (_) {}
    }
    const video = args.video.some((s) => {
        try { return document.querySelector(s) !== null; } catch (_) { return false; }
    });
    return { text, video };
}"#;

pub const INPUT_VALUE: &str = r#"(args) => {
    const node = document.querySelector(args.selector);
    if (!node) { return null; }
    return node.value !== undefined ? node.value : (node.textContent || '');
}"#;

pub const CLEAR_INPUT: &str = r#"(args) => {
    const node = document.querySelector(args.selector);
    if (!node) { return false; }
    if (node.value !== undefined) {
        const setter = Object.getOwnPropertyDescriptor(Object.getPrototypeOf(node), 'value');
        if (setter && setter.set) { setter.set.call(node, ''); } else { node.value = ''; }
    } else {
        node.textContent = '';
    }
    node.dispatchEvent(new Event('input', { bubbles: true }));
    return true;
}"#;

pub const CLICK_LABELED_BUTTON: &str = r#"(args) => {
    const wanted = args.labels.map((l) => l.toLowerCase());
    const scope = args.scope ? (document.querySelector(args.scope) || document).closest('form') || document : document;
    const nodes = scope.querySelectorAll('button, div[role="button"], span[role="button"]');
    for (const node of nodes) {
        const label = (node.textContent || '').trim().toLowerCase();
        if (wanted.includes(label) && !node.disabled) {
            node.click();
            return true;
        }
    }
    return false;
}"#;

pub const CLICK_NEAR_INPUT: &str = r#"(args) => {
    const input = document.querySelector(args.selector);
    if (!input) { return false; }
    const origin = input.getBoundingClientRect();
    let best = null;
    let bestDistance = Infinity;
    document.querySelectorAll('button, div[role="button"], [type="submit"]').forEach((node) => {
        const rect = node.getBoundingClientRect();
        if (rect.width === 0 || rect.height === 0 || node.disabled) { return; }
        const dx = rect.left - origin.right;
        const dy = (rect.top + rect.height / 2) - (origin.top + origin.height / 2);
        const distance = Math.sqrt(dx * dx + dy * dy);
        if (distance < bestDistance && distance < 200) {
            best = node;
            bestDistance = distance;
        }
    });
    if (!best) { return false; }
    best.click();
    return true;
}"#;

pub const TEXT_RENDERED: &str = r#"(args) => {
    const needle = args.text.trim();
    if (!needle) { return false; }
    const nodes = document.querySelectorAll('ul li span, article span, div[role="dialog"] span');
    for (const node of nodes) {
        if (node.closest('form')) { continue; }
        if ((node.textContent || '').includes(needle)) { return true; }
    }
    return false;
}"#;
