// Composition tests — a recorded-looking session through the whole pipeline.
//
// Raw response bodies shaped like real m.weibo.cn traffic go in one end
// (profile index, comment-section noise, first feed page, a later feed page)
// and delivery-ready notifications come out the other:
//   schema -> state -> classify -> sanitize -> Notification

use weibo_watch::notify::Notification;
use weibo_watch::pipeline::state::{FeedResponse, FeedWatch, PhaseKind};
use weibo_watch::weibo::{card_list_request_url, index_request_url};

const UID: &str = "6279793937";

const INDEX: &str = r#"{
  "ok": 1,
  "data": {
    "isVideoCoverStyle": 1,
    "userInfo": {
      "id": 6279793937,
      "screen_name": "测试用户",
      "profile_url": "https://m.weibo.cn/u/6279793937",
      "statuses_count": 1024,
      "verified": true
    },
    "fans_scheme": "sinaweibo://cardlist?containerid=231051_-_fans_-_6279793937",
    "tabsInfo": {
      "selectedTab": 1,
      "tabs": [
        {"id": 1, "tabKey": "profile", "must_show": 1, "hidden": 0, "title": "主页", "tab_type": "profile", "containerid": "2302836279793937"},
        {"id": 2, "tabKey": "weibo", "must_show": 1, "hidden": 0, "title": "微博", "tab_type": "weibo", "containerid": "1076036279793937", "apipath": "/profile/statuses"},
        {"id": 4, "tabKey": "album", "must_show": 0, "hidden": 0, "title": "相册", "tab_type": "album", "containerid": "1078036279793937"}
      ]
    }
  }
}"#;

const FIRST_PAGE: &str = r#"{
  "ok": 1,
  "data": {
    "cardlistInfo": {"containerid": "1076036279793937", "v_p": 42, "show_style": 1, "total": 1024, "since_id": 5210000000000001},
    "cards": [
      {"card_type": 9, "itemid": "1076036279793937_-_5210000000000003", "mblog": {
        "id": "5210000000000003", "mid": "5210000000000003",
        "created_at": "Sat Oct 18 20:15:03 +0800 2025",
        "text": "置顶：新专辑上线<br />",
        "original_pic": "https://wx1.sinaimg.cn/large/pinned.jpg",
        "isTop": 1
      }},
      {"card_type": 9, "mblog": {
        "id": "5210000000000002",
        "created_at": "Sat Oct 18 09:00:00 +0800 2025",
        "text": "早安"
      }},
      {"card_type": 9, "mblog": {
        "id": "5210000000000001",
        "created_at": "Fri Oct 17 22:30:00 +0800 2025",
        "text": "//<a href='/n/朋友'>@朋友</a>:转发",
        "retweeted_status": {"id": "5209999999999999", "text": "原微博"}
      }}
    ]
  }
}"#;

const COMMENTS: &str = r#"{
  "ok": 1,
  "data": {
    "cards": [
      {"card_type": 9, "mblog": {
        "id": "5999999999999999",
        "created_at": "Sun Oct 19 23:59:59 +0800 2025",
        "text": "someone else's post in a different container"
      }}
    ]
  }
}"#;

const SECOND_PAGE: &str = r##"{
  "ok": 1,
  "data": {
    "cards": [
      {"card_type": 9, "mblog": {
        "id": "5210000000000003",
        "created_at": "Sat Oct 18 20:15:03 +0800 2025",
        "text": "置顶：新专辑上线<br />"
      }},
      {"card_type": 9, "mblog": {
        "id": "5210000000000006",
        "created_at": "Sun Oct 19 12:00:00 +0800 2025",
        "text": "新视频来啦<span class=\"url-icon\"><img alt=\"[心]\" src=\"https://h5.sinaimg.cn/m/emoticon/icon/others/l_xin.png\" /></span> <a  href=\"https://m.weibo.cn/search?containerid=231522type%3D1%26q%3D%23MV%23\" data-hide=\"\"><span class=\"surl-text\">#MV#</span></a>",
        "original_pic": "https://wx1.sinaimg.cn/large/still.jpg",
        "page_info": {"type": "video", "page_pic": {"url": "https://wx1.sinaimg.cn/orj480/cover.jpg"}, "page_url": "https://video.weibo.com/show?fid=1034:1"}
      }},
      {"card_type": 9, "mblog": {
        "id": "5210000000000005",
        "created_at": "Sun Oct 19 10:00:00 +0800 2025",
        "text": "长文发布 &amp; 欢迎阅读...<a href=\"/status/5210000000000005\">全文</a>",
        "page_info": {"type": "article", "page_pic": {"url": "https://wx1.sinaimg.cn/article.jpg"}, "page_url": "https://card.weibo.com/article/m/show/id/2309405210000000000005"}
      }},
      {"card_type": 9, "mblog": {
        "id": "5210000000000004",
        "created_at": "Sun Oct 19 08:00:00 +0800 2025",
        "text": "转发本条抽送签名专辑<br /><br /><br /><br />微博官方唯一抽奖工具 <a href=\"https://lottery.media.weibo.com\">抽奖详情</a>对本次抽奖进行监督，结果公正有效"
      }},
      {"card_type": 11, "mblog": {
        "id": "5210000000000007",
        "created_at": "Sun Oct 19 13:00:00 +0800 2025",
        "text": "recommended module"
      }}
    ]
  }
}"##;

fn feed_url() -> String {
    card_list_request_url(UID, "1076036279793937")
}

fn run(watch: &mut FeedWatch, url: &str, body: &str) -> Vec<Notification> {
    watch
        .apply(FeedResponse {
            request_url: url,
            body,
        })
        .notifications
}

#[test]
fn recorded_session_end_to_end() {
    let mut watch = FeedWatch::new(UID);

    assert!(run(&mut watch, &index_request_url(UID), INDEX).is_empty());
    assert_eq!(watch.phase_kind(), PhaseKind::IdentityResolved);

    // Comment threads come through the same endpoint for a different container.
    let comments_url = card_list_request_url(UID, "2310936279793937");
    assert!(run(&mut watch, &comments_url, COMMENTS).is_empty());
    assert_eq!(watch.phase_kind(), PhaseKind::IdentityResolved);

    // History on the first page is never notified.
    assert!(run(&mut watch, &feed_url(), FIRST_PAGE).is_empty());
    assert_eq!(watch.phase_kind(), PhaseKind::WatermarkSeeded);
    assert_eq!(
        watch.watermark().unwrap().to_rfc3339(),
        "2025-10-18T12:15:03+00:00"
    );

    let notifications = run(&mut watch, &feed_url(), SECOND_PAGE);

    assert_eq!(
        notifications,
        vec![
            Notification {
                title: "测试用户".to_string(),
                body: "新视频来啦[心]".to_string(),
                url: "https://m.weibo.cn/status/5210000000000006".to_string(),
                pic_url: "https://wx1.sinaimg.cn/orj480/cover.jpg".to_string(),
            },
            Notification {
                title: "测试用户".to_string(),
                body: "长文发布 & 欢迎阅读...".to_string(),
                url: "https://card.weibo.com/article/m/show/id/2309405210000000000005".to_string(),
                pic_url: "https://wx1.sinaimg.cn/article.jpg".to_string(),
            },
        ]
    );

    // The recommended module (card_type 11) is the newest card in the batch.
    assert_eq!(watch.phase_kind(), PhaseKind::Steady);
    assert_eq!(
        watch.watermark().unwrap().to_rfc3339(),
        "2025-10-19T05:00:00+00:00"
    );

    // Reloading the same page yields nothing new.
    assert!(run(&mut watch, &feed_url(), SECOND_PAGE).is_empty());
}

#[test]
fn restarted_watch_does_not_backfill() {
    // A second session over the same traffic starts from scratch and seeds
    // from whatever page it sees first.
    let mut watch = FeedWatch::new(UID);
    run(&mut watch, &index_request_url(UID), INDEX);

    assert!(run(&mut watch, &feed_url(), SECOND_PAGE).is_empty());
    assert!(run(&mut watch, &feed_url(), FIRST_PAGE).is_empty());
    assert_eq!(
        watch.watermark().unwrap().to_rfc3339(),
        "2025-10-19T05:00:00+00:00"
    );
}
