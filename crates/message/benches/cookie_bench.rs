use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use http::header::{COOKIE, SET_COOKIE};
use http::{Request, Response};
use micro_http_message::config::HttpConfig;
use micro_http_message::cookie::{Cookie, CookieHeader, EncodePolicy, decode, encode};
use micro_http_message::message::{RequestMessage, ResponseMessage};

const COOKIE_LINE: &str = "session=3f2a9c1e; theme=dark; lang=en-US; tracking_id=\"a b c\"; consent=yes";
const SET_COOKIE_LINE: &str = "session=3f2a9c1e; Domain=example.com; Path=/; Max-Age=3600; Secure; HttpOnly; SameSite=Lax";

fn bench_codec(c: &mut Criterion) {
    c.bench_function("decode_cookie_line", |b| {
        b.iter(|| black_box(decode(black_box(COOKIE_LINE), CookieHeader::Cookie)));
    });

    c.bench_function("decode_set_cookie_line", |b| {
        b.iter(|| black_box(decode(black_box(SET_COOKIE_LINE), CookieHeader::SetCookie)));
    });

    let mut cookie = Cookie::new("session", "3f2a9c1e");
    cookie.set_domain(Some("example.com"));
    cookie.set_path(Some("/"));
    cookie.set_secure(true);
    cookie.set_attribute("samesite", Some("Lax"));
    let policy = EncodePolicy::default();
    c.bench_function("encode_set_cookie", |b| {
        b.iter(|| black_box(encode(black_box(&cookie), CookieHeader::SetCookie, &policy)));
    });
}

fn bench_catch_up(c: &mut Criterion) {
    let config = Arc::new(HttpConfig::default());

    c.bench_function("catch_up_repeated_reads", |b| {
        b.iter(|| {
            let request = Request::get("/").header(COOKIE, COOKIE_LINE).body(()).unwrap();
            let mut message = RequestMessage::inbound(request, None, Arc::clone(&config));
            for _ in 0..16 {
                black_box(message.cookie_value("lang"));
            }
        });
    });

    c.bench_function("catch_up_appended_lines", |b| {
        b.iter(|| {
            let mut message = RequestMessage::inbound(Request::get("/").body(()).unwrap(), None, Arc::clone(&config));
            for i in 0..16 {
                message.append_header(COOKIE, format!("c{i}=v{i}")).unwrap();
                black_box(message.all_cookies());
            }
        });
    });
}

fn bench_marshall(c: &mut Criterion) {
    let plain = Arc::new(HttpConfig::default());
    let policy = Arc::new(
        HttpConfig::builder()
            .same_site_lax(["session"])
            .same_site_none(["track*"])
            .partitioned(true)
            .do_not_allow_duplicate_set_cookies(true)
            .build()
            .unwrap(),
    );

    for (name, config) in [("marshall_set_cookies_plain", plain), ("marshall_set_cookies_policy", policy)] {
        c.bench_function(name, |b| {
            b.iter(|| {
                let mut message = ResponseMessage::outbound(Response::new(()), None, Arc::clone(&config));
                message.append_header(SET_COOKIE, SET_COOKIE_LINE).unwrap();
                for i in 0..8 {
                    message.set_cookie_value(&format!("track{i}"), "1", CookieHeader::SetCookie);
                }
                message.process_cookies();
                black_box(message.number_of_headers());
            });
        });
    }
}

criterion_group!(benches, bench_codec, bench_catch_up, bench_marshall);
criterion_main!(benches);
