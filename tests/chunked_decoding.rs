//! Chunked transfer-coding, including bodies that only claim to be chunked.

use bytes::Bytes;
use hopwire::{decode_chunked, parse_response};
use http::Method;

fn chunked_response(body: &str) -> Bytes {
    let mut raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
    raw.extend_from_slice(body.as_bytes());
    Bytes::from(raw)
}

fn decoded(body: &str) -> String {
    let resp = parse_response(chunked_response(body), &Method::GET).unwrap();
    String::from_utf8(resp.body.to_vec()).unwrap()
}

#[test]
fn test_chunked_bodies() {
    let cases = [
        (
            "25\r\nThis is the data in the first chunk\r\n\r\n1A\r\nand this is the second one\r\n0\r\n",
            "This is the data in the first chunk\r\nand this is the second one",
        ),
        (
            "02\r\nab\r\n04\r\nra\nc\r\n06\r\nadabra\r\n0\r\nnothing\n",
            "abra\ncadabra",
        ),
        (
            "02\r\nab\r\n04\r\nra\nc\r\n06\r\nadabra\r\n0c\r\n\nall we got\n",
            "abra\ncadabra\nall we got\n",
        ),
        (
            "02;foo=bar;hello=world\r\nab\r\n04;foo=baz\r\nra\nc\r\n06;justfoo\r\nadabra\r\n0c\r\n\nall we got\n",
            "abra\ncadabra\nall we got\n",
        ),
        (
            "02;foo=\"quoted value\"\r\nab\r\n04\r\nra\nc\r\n06\r\nadabra\r\n0c\r\n\nall we got\n",
            "abra\ncadabra\nall we got\n",
        ),
        (
            "02;foo-bar=baz\r\nab\r\n04\r\nra\nc\r\n06\r\nadabra\r\n0c\r\n\nall we got\n",
            "abra\ncadabra\nall we got\n",
        ),
    ];

    for (body, expected) in cases {
        assert_eq!(decoded(body), expected, "body: {:?}", body);
    }
}

#[test]
fn test_not_actually_chunked() {
    let cases = [
        ("empty string", ""),
        ("invalid chunk size", "Hello! This is a non-chunked response!"),
        ("invalid chunk extension", "1BNot chunked\r\nLooks chunked but it is not\r\n"),
        (
            "unquoted chunk-ext-val with space",
            "02;foo=unquoted with space\r\nab\r\n04\r\nra\nc\r\n06\r\nadabra\r\n0c\r\n\nall we got\n",
        ),
        (
            "unquoted chunk-ext-val with forbidden character",
            "02;foo={unquoted}\r\nab\r\n04\r\nra\nc\r\n06\r\nadabra\r\n0c\r\n\nall we got\n",
        ),
        (
            "invalid chunk-ext-name",
            "02;{foo}=bar\r\nab\r\n04\r\nra\nc\r\n06\r\nadabra\r\n0c\r\n\nall we got\n",
        ),
        (
            "incomplete quote for chunk-ext-value",
            "02;foo=\"no end quote\r\nab\r\n04\r\nra\nc\r\n06\r\nadabra\r\n0c\r\n\nall we got\n",
        ),
    ];

    for (name, body) in cases {
        assert_eq!(decoded(body), body, "{}", name);
    }
}

#[test]
fn test_mixed_chunkiness() {
    let body = "02\r\nab\r\nNot actually chunked!";
    assert_eq!(decoded(body), body);
}

#[test]
fn test_decode_chunked_directly() {
    assert_eq!(
        decode_chunked(b"4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n"),
        Bytes::from_static(b"Wikipedia")
    );
    assert_eq!(
        decode_chunked(b"4\r\nWiki\r\n0\r\nX-Trailer: yes\r\n\r\n"),
        Bytes::from_static(b"Wiki")
    );
}

#[test]
fn test_chunked_ignored_for_head() {
    let resp = parse_response(chunked_response("4\r\nWiki\r\n0\r\n\r\n"), &Method::HEAD).unwrap();
    assert!(resp.body.is_empty());
}
